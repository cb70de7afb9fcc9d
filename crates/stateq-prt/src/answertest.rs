//! Answer-test registry.
//!
//! An answer test compares a student expression with a teacher
//! expression and is invoked from generated code as
//! `AT<Codename>(sans, tans[, options])`. The result is the list
//! `[outcome, answernote, feedback]`. Lookups by codename fail closed:
//! an unknown codename is an error, never a silent pass.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use stateq_types::{CasExpr, CasKind};

use crate::error::AnswerTestError;

/// Prefix of the variable that holds an input's raw response text.
pub const RAW_INPUT_PREFIX: &str = "%_raw_";

/// The options argument shape an answer test accepts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OptionKind {
    /// Takes no options.
    None,
    /// A variable name, e.g. the variable of differentiation.
    Variable,
    /// A positive number, e.g. a tolerance.
    PositiveNumber,
    PositiveInteger,
    /// A positive integer, or `[n, m]` for a range of significant figures.
    SigFigs,
}

/// Static description of an answer test's options, for authoring tools
/// and for validation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct OptionMeta {
    pub kind: OptionKind,
    pub required: bool,
    pub description: &'static str,
}

impl OptionMeta {
    pub const NONE: OptionMeta = OptionMeta {
        kind: OptionKind::None,
        required: false,
        description: "",
    };

    pub fn required(kind: OptionKind, description: &'static str) -> Self {
        Self {
            kind,
            required: true,
            description,
        }
    }
}

/// The parsed arguments of one test invocation.
#[derive(Debug, Clone, Copy)]
pub struct TestCall<'a> {
    pub sans: &'a CasExpr,
    pub tans: Option<&'a CasExpr>,
    pub options: Option<&'a CasExpr>,
    /// Input names declared by the enclosing scene.
    pub inputs: &'a [String],
}

pub trait AnswerTest: Send + Sync {
    fn codename(&self) -> &str;

    fn option_meta(&self) -> OptionMeta;

    fn requires_teacher_answer(&self) -> bool {
        true
    }

    /// The test needs the raw response text of an input, not its value.
    fn requires_direct_input(&self) -> bool {
        false
    }

    /// Field name to message; empty when the call is acceptable.
    fn validate(&self, call: &TestCall<'_>) -> BTreeMap<String, String> {
        check_call(self, call)
    }

    /// The CAS expression that runs the test.
    fn cascall(&self, call: &TestCall<'_>) -> Result<CasExpr, AnswerTestError> {
        let fields = self.validate(call);
        if !fields.is_empty() {
            return Err(AnswerTestError::Invalid {
                codename: self.codename().to_string(),
                fields,
            });
        }
        Ok(standard_call(self, call))
    }
}

/// The checks every catalog test shares: teacher answer present,
/// direct-input references, option shape.
pub fn check_call<T: AnswerTest + ?Sized>(test: &T, call: &TestCall<'_>) -> BTreeMap<String, String> {
    let mut fields = BTreeMap::new();
    if test.requires_teacher_answer() && call.tans.is_none() {
        fields.insert("tans".to_string(), "a teacher answer is required".to_string());
    }
    if test.requires_direct_input() {
        match call.sans.as_ident() {
            Some(name) if call.inputs.iter().any(|i| i == name) => {}
            _ => {
                fields.insert(
                    "sans".to_string(),
                    format!("must name an input directly, found '{}'", call.sans),
                );
            }
        }
    }
    if let Some(message) = check_options(&test.option_meta(), call.options) {
        fields.insert("options".to_string(), message);
    }
    fields
}

fn check_options(meta: &OptionMeta, options: Option<&CasExpr>) -> Option<String> {
    let Some(options) = options else {
        return meta.required.then(|| match meta.kind {
            OptionKind::Variable => "a variable is required".to_string(),
            OptionKind::SigFigs => "a number of significant figures is required".to_string(),
            OptionKind::PositiveNumber => "a positive tolerance is required".to_string(),
            _ => "an option is required".to_string(),
        });
    };
    let accepted = match meta.kind {
        OptionKind::None => return Some("this test takes no options".to_string()),
        OptionKind::Variable => options.as_ident().is_some(),
        OptionKind::PositiveNumber => options.as_number().is_some_and(|n| n > 0.0),
        OptionKind::PositiveInteger => positive_integer(options).is_some(),
        OptionKind::SigFigs => match &options.kind {
            CasKind::List(items) => match items.as_slice() {
                [n, m] => positive_integer(n).is_some() && unsigned(m).is_some(),
                _ => false,
            },
            _ => positive_integer(options).is_some(),
        },
    };
    if accepted {
        return None;
    }
    Some(match meta.kind {
        OptionKind::Variable => format!("'{options}' is not a variable name"),
        OptionKind::PositiveNumber => format!("'{options}' is not a positive number"),
        OptionKind::PositiveInteger => format!("'{options}' is not a positive integer"),
        _ => format!("'{options}' is neither a positive integer nor a list [n, m]"),
    })
}

fn unsigned(expr: &CasExpr) -> Option<u64> {
    match &expr.kind {
        CasKind::Number(text) => text.parse().ok(),
        _ => None,
    }
}

fn positive_integer(expr: &CasExpr) -> Option<u64> {
    unsigned(expr).filter(|n| *n > 0)
}

/// `AT<Codename>(sans, tans[, options])`, with direct-input substitution.
pub fn standard_call<T: AnswerTest + ?Sized>(test: &T, call: &TestCall<'_>) -> CasExpr {
    let sans = match call.sans.as_ident() {
        Some(name) if test.requires_direct_input() => {
            CasExpr::ident(format!("{RAW_INPUT_PREFIX}{name}"))
        }
        _ => call.sans.clone(),
    };
    let tans = call.tans.cloned().unwrap_or_else(|| CasExpr::string(""));
    let mut args = vec![sans, tans];
    if let Some(options) = call.options {
        args.push(options.clone());
    }
    CasExpr::call(format!("AT{}", test.codename()), args)
}

// ══════════════════════════════════════════════════════════════════════════════
// Catalog
// ══════════════════════════════════════════════════════════════════════════════

/// A built-in test: everything about it is static.
#[derive(Debug, Clone, Copy)]
struct CatalogTest {
    codename: &'static str,
    options: OptionMeta,
    direct_input: bool,
}

impl AnswerTest for CatalogTest {
    fn codename(&self) -> &str {
        self.codename
    }

    fn option_meta(&self) -> OptionMeta {
        self.options
    }

    fn requires_direct_input(&self) -> bool {
        self.direct_input
    }
}

/// What authoring tools need to know about one registered test.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestDescription {
    pub codename: String,
    pub options: OptionMeta,
    pub requires_teacher_answer: bool,
    pub requires_direct_input: bool,
}

/// Registry mapping codename → answer test.
pub struct AnswerTestRegistry {
    tests: BTreeMap<String, Box<dyn AnswerTest>>,
}

impl AnswerTestRegistry {
    /// A registry holding the full built-in catalog.
    pub fn new() -> Self {
        let mut reg = Self::empty();
        reg.register_algebraic();
        reg.register_calculus();
        reg.register_numerical();
        reg.register_string();
        reg
    }

    pub fn empty() -> Self {
        Self {
            tests: BTreeMap::new(),
        }
    }

    /// Add or replace a test; returns the one it replaced.
    pub fn register(&mut self, test: Box<dyn AnswerTest>) -> Option<Box<dyn AnswerTest>> {
        self.tests.insert(test.codename().to_string(), test)
    }

    pub fn get(&self, codename: &str) -> Result<&dyn AnswerTest, AnswerTestError> {
        self.tests
            .get(codename)
            .map(|t| t.as_ref())
            .ok_or_else(|| AnswerTestError::Unknown(codename.to_string()))
    }

    pub fn contains(&self, codename: &str) -> bool {
        self.tests.contains_key(codename)
    }

    /// Registered codenames in sorted order.
    pub fn codenames(&self) -> impl Iterator<Item = &str> {
        self.tests.keys().map(String::as_str)
    }

    pub fn describe(&self) -> Vec<TestDescription> {
        self.tests
            .values()
            .map(|t| TestDescription {
                codename: t.codename().to_string(),
                options: t.option_meta(),
                requires_teacher_answer: t.requires_teacher_answer(),
                requires_direct_input: t.requires_direct_input(),
            })
            .collect()
    }

    // ──────────────────────────────────────────────────────────────────────
    // Registration helpers
    // ──────────────────────────────────────────────────────────────────────

    fn add(&mut self, codename: &'static str, options: OptionMeta, direct_input: bool) {
        self.register(Box::new(CatalogTest {
            codename,
            options,
            direct_input,
        }));
    }

    fn register_algebraic(&mut self) {
        for codename in [
            "AlgEquiv",
            "EqualComAss",
            "CasEqual",
            "SameType",
            "SubstEquiv",
            "Sets",
            "Expanded",
            "SingleFrac",
        ] {
            self.add(codename, OptionMeta::NONE, false);
        }
        let variable = OptionMeta::required(OptionKind::Variable, "the main variable");
        self.add("FacForm", variable, false);
        self.add("PartFrac", variable, false);
        self.add("CompSquare", variable, false);
    }

    fn register_calculus(&mut self) {
        let variable = OptionMeta::required(OptionKind::Variable, "the variable of integration or differentiation");
        self.add("Diff", variable, false);
        self.add("Int", variable, false);
    }

    fn register_numerical(&mut self) {
        self.add("GT", OptionMeta::NONE, false);
        self.add("GTE", OptionMeta::NONE, false);
        let tolerance = OptionMeta::required(OptionKind::PositiveNumber, "tolerance");
        self.add("NumRelative", tolerance, false);
        self.add("NumAbsolute", tolerance, false);
        self.add(
            "NumSigFigs",
            OptionMeta::required(OptionKind::SigFigs, "significant figures, or [n, m]"),
            true,
        );
        self.add(
            "NumDecPlaces",
            OptionMeta::required(OptionKind::PositiveInteger, "decimal places"),
            true,
        );
        self.add(
            "Units",
            OptionMeta::required(OptionKind::PositiveInteger, "significant figures"),
            true,
        );
    }

    fn register_string(&mut self) {
        self.add("String", OptionMeta::NONE, false);
        self.add("StringSloppy", OptionMeta::NONE, false);
        // The teacher answer is the pattern.
        self.add("Regex", OptionMeta::NONE, false);
    }
}

impl Default for AnswerTestRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for AnswerTestRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.tests.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stateq_parser::parse_expression;

    fn expr(source: &str) -> CasExpr {
        parse_expression(source).into_result().unwrap()
    }

    fn inputs() -> Vec<String> {
        vec!["ans1".to_string()]
    }

    #[test]
    fn test_catalog_is_complete() {
        let reg = AnswerTestRegistry::new();
        assert_eq!(reg.codenames().count(), 23);
        for codename in ["AlgEquiv", "NumSigFigs", "Regex", "Int", "GTE"] {
            assert!(reg.contains(codename), "{codename}");
        }
    }

    #[test]
    fn test_unknown_codename_fails_closed() {
        let reg = AnswerTestRegistry::new();
        assert_eq!(
            reg.get("AlgEquivalent").err(),
            Some(AnswerTestError::Unknown("AlgEquivalent".into()))
        );
    }

    #[test]
    fn test_plain_call() {
        let reg = AnswerTestRegistry::new();
        let sans = expr("ans1");
        let tans = expr("x^2");
        let inputs = inputs();
        let call = TestCall {
            sans: &sans,
            tans: Some(&tans),
            options: None,
            inputs: &inputs,
        };
        let code = reg.get("AlgEquiv").unwrap().cascall(&call).unwrap();
        assert_eq!(code.to_string(), "ATAlgEquiv(ans1, x^2)");
    }

    #[test]
    fn test_missing_tolerance_is_rejected() {
        let reg = AnswerTestRegistry::new();
        let sans = expr("ans1");
        let tans = expr("3.14");
        let inputs = inputs();
        let call = TestCall {
            sans: &sans,
            tans: Some(&tans),
            options: None,
            inputs: &inputs,
        };
        for codename in ["NumRelative", "NumAbsolute"] {
            let test = reg.get(codename).unwrap();
            let fields = test.validate(&call);
            assert_eq!(fields.keys().collect::<Vec<_>>(), vec!["options"], "{codename}");
            assert!(matches!(
                test.cascall(&call),
                Err(AnswerTestError::Invalid { .. })
            ));
        }
    }

    #[test]
    fn test_tolerance_is_passed_through() {
        let reg = AnswerTestRegistry::new();
        let sans = expr("ans1");
        let tans = expr("3.14");
        let options = expr("0.01");
        let inputs = inputs();
        let call = TestCall {
            sans: &sans,
            tans: Some(&tans),
            options: Some(&options),
            inputs: &inputs,
        };
        let code = reg.get("NumRelative").unwrap().cascall(&call).unwrap();
        assert_eq!(code.to_string(), "ATNumRelative(ans1, 3.14, 0.01)");
    }

    #[test]
    fn test_direct_input_uses_raw_response() {
        let reg = AnswerTestRegistry::new();
        let sans = expr("ans1");
        let tans = expr("0.0120");
        let options = expr("3");
        let inputs = inputs();
        let call = TestCall {
            sans: &sans,
            tans: Some(&tans),
            options: Some(&options),
            inputs: &inputs,
        };
        let code = reg.get("NumSigFigs").unwrap().cascall(&call).unwrap();
        assert_eq!(code.to_string(), "ATNumSigFigs(%_raw_ans1, 0.0120, 3)");
    }

    #[test]
    fn test_direct_input_rejects_expressions() {
        let reg = AnswerTestRegistry::new();
        let sans = expr("ans1 + 1");
        let tans = expr("2");
        let options = expr("[3, 1]");
        let inputs = inputs();
        let call = TestCall {
            sans: &sans,
            tans: Some(&tans),
            options: Some(&options),
            inputs: &inputs,
        };
        let fields = reg.get("NumSigFigs").unwrap().validate(&call);
        assert_eq!(fields.keys().collect::<Vec<_>>(), vec!["sans"]);
    }

    #[test]
    fn test_option_meta_serializes() {
        let reg = AnswerTestRegistry::new();
        let meta = reg.get("NumAbsolute").unwrap().option_meta();
        let json = serde_json::to_value(meta).unwrap();
        assert_eq!(json["kind"]["type"], "positive_number");
        assert_eq!(json["required"], true);
        assert_eq!(json["description"], "tolerance");
    }

    #[test]
    fn test_custom_test_can_be_registered() {
        struct Always;
        impl AnswerTest for Always {
            fn codename(&self) -> &str {
                "Always"
            }
            fn option_meta(&self) -> OptionMeta {
                OptionMeta::NONE
            }
            fn requires_teacher_answer(&self) -> bool {
                false
            }
        }
        let mut reg = AnswerTestRegistry::empty();
        assert!(reg.register(Box::new(Always)).is_none());
        let sans = expr("ans1");
        let call = TestCall {
            sans: &sans,
            tans: None,
            options: None,
            inputs: &[],
        };
        let code = reg.get("Always").unwrap().cascall(&call).unwrap();
        assert_eq!(code.to_string(), "ATAlways(ans1, \"\")");
    }
}
