//! Property tests over generated block trees.

use proptest::prelude::*;
use stateq_castext::{compile_castext, lower, postprocess, Block, CasTextContext, NoProcessor, PostprocessContext};
use stateq_eval::{Evaluator, Value};
use stateq_types::{Binding, BlockKind, BlockNode, CasText, CompileOptions, IfBranch, InjectMode, Position};

fn node(kind: BlockKind) -> BlockNode {
    BlockNode::new(kind, Position::new(0, 0))
}

fn branch(condition: Option<&str>, children: Vec<BlockNode>) -> IfBranch {
    IfBranch {
        condition: condition.map(str::to_string),
        children,
        position: Position::new(0, 0),
    }
}

fn leaf() -> impl Strategy<Value = BlockNode> {
    prop_oneof![
        "[a-z ]{1,6}".prop_map(|text| node(BlockKind::Raw { text })),
        (
            any::<bool>(),
            prop::sample::select(vec!["x", "x + 1", "x^2", "[x, 2]"])
        )
            .prop_map(|(latex, expression)| node(BlockKind::Inject {
                mode: if latex { InjectMode::Latex } else { InjectMode::Value },
                expression: expression.to_string(),
            })),
    ]
}

fn tree() -> impl Strategy<Value = BlockNode> {
    leaf().prop_recursive(4, 32, 4, |inner| {
        let kids = prop::collection::vec(inner, 0..4);
        prop_oneof![
            kids.clone().prop_map(|children| node(BlockKind::Foreach {
                iterators: vec![Binding::new("x", "[1, 2]")],
                children,
            })),
            (kids.clone(), kids.clone()).prop_map(|(then, otherwise)| node(BlockKind::If {
                branches: vec![branch(Some("x = 1"), then), branch(None, otherwise)],
            })),
            kids.prop_map(|children| node(BlockKind::Named {
                name: "lang".into(),
                params: vec![Binding::new("code", "en")],
                children,
            })),
        ]
    })
}

fn template() -> impl Strategy<Value = CasText> {
    prop::collection::vec(tree(), 0..5)
        .prop_map(|children| CasText::new("", node(BlockKind::Root { children })))
}

fn has_marker(node: &BlockNode) -> bool {
    matches!(node.kind, BlockKind::Named { .. }) || node.children().into_iter().any(has_marker)
}

fn containers_agree(block: &Block) -> bool {
    let own = match block {
        Block::Container(children) => block.is_flat() == children.iter().all(Block::is_flat),
        _ => true,
    };
    own && block.children().into_iter().all(containers_agree)
}

proptest! {
    #[test]
    fn compile_is_deterministic(text in template()) {
        let options = CompileOptions::default();
        let ctx = CasTextContext::new(&options);
        let first = compile_castext(&text, &ctx).unwrap();
        let second = compile_castext(&text, &ctx).unwrap();
        prop_assert_eq!(first.code(), second.code());
    }

    #[test]
    fn flatness_propagates(text in template()) {
        let block = lower(&text.root, &[]).unwrap();
        prop_assert!(containers_agree(&block));
        prop_assert_eq!(block.is_flat(), !has_marker(&text.root));

        let options = CompileOptions::default();
        let compiled = compile_castext(&text, &CasTextContext::new(&options)).unwrap();
        prop_assert_eq!(compiled.flat, block.is_flat());
    }

    #[test]
    fn evaluation_matches_flatness(text in template()) {
        let options = CompileOptions::default();
        let compiled = compile_castext(&text, &CasTextContext::new(&options)).unwrap();
        let mut ev = Evaluator::new();
        ev.set_var("x", Value::Int(1));
        let value = ev.run(&compiled.code()).unwrap();
        if compiled.flat {
            prop_assert!(matches!(value, Value::Str(_)), "flat template gave {}", value);
        } else {
            let mut ctx = PostprocessContext::new();
            prop_assert!(postprocess(&value.to_cas_value(), &NoProcessor, &mut ctx).is_ok());
        }
    }
}
