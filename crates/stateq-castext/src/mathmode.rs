//! Math-mode classification of template source.
//!
//! LaTeX math delimiters do not line up with block boundaries, so the scan
//! runs over the raw template text and the per-byte result is mapped back
//! onto block nodes afterwards.

use stateq_types::{BlockKind, BlockNode, Position};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Delim {
    Inline,
    Display,
    Dollars,
    Env(String),
}

/// Classify every byte of `source`. Delimiters inside `skip` ranges are
/// ignored; those bytes inherit the surrounding state.
pub fn scan(source: &str, skip: &[Position], environments: &[String]) -> Vec<bool> {
    let bytes = source.as_bytes();
    let mut map = vec![false; bytes.len()];
    let mut stack: Vec<Delim> = Vec::new();
    let mut skip: Vec<Position> = skip.to_vec();
    skip.sort_by_key(|p| p.start);
    let mut next_skip = 0;
    let mut i = 0;

    while i < bytes.len() {
        while next_skip < skip.len() && skip[next_skip].end <= i {
            next_skip += 1;
        }
        if let Some(range) = skip.get(next_skip).filter(|r| r.start <= i) {
            let end = range.end.min(bytes.len());
            let inside = !stack.is_empty();
            map[i..end].fill(inside);
            i = end;
            continue;
        }

        let Some(rest) = source.get(i..) else {
            map[i] = !stack.is_empty();
            i += 1;
            continue;
        };
        let (len, change) = delimiter_at(rest, stack.last(), environments);
        match change {
            Some(Change::Open(delim)) => {
                stack.push(delim);
                map[i..i + len].fill(true);
            }
            Some(Change::Close) => {
                map[i..i + len].fill(true);
                stack.pop();
            }
            None => map[i..i + len].fill(!stack.is_empty()),
        }
        i += len;
    }
    map
}

enum Change {
    Open(Delim),
    Close,
}

/// Length of the token at the start of `rest` and the mode change it causes.
fn delimiter_at(rest: &str, top: Option<&Delim>, environments: &[String]) -> (usize, Option<Change>) {
    if rest.starts_with("\\(") {
        return (2, Some(Change::Open(Delim::Inline)));
    }
    if rest.starts_with("\\)") {
        return (2, (top == Some(&Delim::Inline)).then_some(Change::Close));
    }
    if rest.starts_with("\\[") {
        return (2, Some(Change::Open(Delim::Display)));
    }
    if rest.starts_with("\\]") {
        return (2, (top == Some(&Delim::Display)).then_some(Change::Close));
    }
    if rest.starts_with("$$") {
        return if top == Some(&Delim::Dollars) {
            (2, Some(Change::Close))
        } else {
            (2, Some(Change::Open(Delim::Dollars)))
        };
    }
    if let Some(env) = environment(rest, "\\begin{", environments) {
        let len = "\\begin{".len() + env.len() + 1;
        return (len, Some(Change::Open(Delim::Env(env))));
    }
    if let Some(env) = environment(rest, "\\end{", environments) {
        let len = "\\end{".len() + env.len() + 1;
        let closes = top == Some(&Delim::Env(env));
        return (len, closes.then_some(Change::Close));
    }
    if rest.starts_with("\\\\") {
        return (2, None);
    }
    let len = rest.chars().next().map_or(1, char::len_utf8);
    (len, None)
}

fn environment(rest: &str, prefix: &str, environments: &[String]) -> Option<String> {
    let tail = rest.strip_prefix(prefix)?;
    let close = tail.find('}')?;
    let name = &tail[..close];
    environments
        .iter()
        .any(|e| e == name)
        .then(|| name.to_string())
}

/// Ranges the scan must not interpret: comments, injections, escapes, and
/// the header/footer parts of blocks (everything a block covers that its
/// children do not).
pub fn skip_ranges(root: &BlockNode) -> Vec<Position> {
    let mut ranges = Vec::new();
    collect_skips(root, true, &mut ranges);
    ranges
}

fn collect_skips(node: &BlockNode, is_root: bool, out: &mut Vec<Position>) {
    match &node.kind {
        BlockKind::Raw { .. } => {}
        BlockKind::Comment { .. }
        | BlockKind::Inject { .. }
        | BlockKind::Escape { .. }
        | BlockKind::Define { .. } => out.push(node.position),
        _ => {
            let children = node.children();
            if !is_root {
                let mut covered: Vec<Position> = children.iter().map(|c| c.position).collect();
                if let BlockKind::If { branches } = &node.kind {
                    covered = branches
                        .iter()
                        .flat_map(|b| b.children.iter().map(|c| c.position))
                        .collect();
                }
                out.extend(gaps(node.position, &covered));
            }
            for child in children {
                collect_skips(child, false, out);
            }
        }
    }
}

/// Parts of `outer` not covered by any of `inner`.
fn gaps(outer: Position, inner: &[Position]) -> Vec<Position> {
    let mut sorted = inner.to_vec();
    sorted.sort_by_key(|p| p.start);
    let mut out = Vec::new();
    let mut cursor = outer.start;
    for p in sorted {
        if p.start > cursor {
            out.push(Position::new(cursor, p.start));
        }
        cursor = cursor.max(p.end);
    }
    if cursor < outer.end {
        out.push(Position::new(cursor, outer.end));
    }
    out
}

/// Set `math_mode` on every node from the byte map.
pub fn apply(node: &mut BlockNode, map: &[bool]) {
    node.math_mode = map.get(node.position.start).copied().unwrap_or(false);
    match &mut node.kind {
        BlockKind::Root { children }
        | BlockKind::Foreach { children, .. }
        | BlockKind::Named { children, .. } => {
            for child in children {
                apply(child, map);
            }
        }
        BlockKind::If { branches } => {
            for branch in branches {
                for child in &mut branch.children {
                    apply(child, map);
                }
            }
        }
        _ => {}
    }
}

/// Scan `source` and annotate `root` in one go.
pub fn annotate(root: &mut BlockNode, source: &str, environments: &[String]) {
    let skip = skip_ranges(root);
    let map = scan(source, &skip, environments);
    apply(root, &map);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envs() -> Vec<String> {
        stateq_types::CompileOptions::default().math_environments
    }

    #[test]
    fn inline_and_display_delimiters() {
        let src = r"\(a\) b \[c\]";
        let map = scan(src, &[], &envs());
        assert!(map[2], "a is math");
        assert!(!map[6], "b is text");
        assert!(map[10], "c is math");
    }

    #[test]
    fn comment_span_does_not_disturb_surroundings() {
        let src = r"\(a\) [[comment]]\(x[[/comment]] b \[c\]";
        let start = src.find("[[comment]]").unwrap();
        let end = src.find("[[/comment]]").unwrap() + "[[/comment]]".len();
        let map = scan(src, &[Position::new(start, end)], &envs());
        assert!(map[2]);
        let b = src.rfind(" b ").unwrap() + 1;
        assert!(!map[b]);
        let c = src.rfind('c').unwrap();
        assert!(map[c]);
    }

    #[test]
    fn named_environments() {
        let src = r"\begin{align*}x\end{align*} y \begin{center}z\end{center}";
        let map = scan(src, &[], &envs());
        assert!(map[src.find('x').unwrap()]);
        assert!(!map[src.find('y').unwrap()]);
        assert!(!map[src.find('z').unwrap()]);
    }

    #[test]
    fn double_dollars_toggle() {
        let src = "$$x$$ y";
        let map = scan(src, &[], &envs());
        assert!(map[2]);
        assert!(!map[6]);
    }

    #[test]
    fn gaps_cover_headers_and_footers() {
        let g = gaps(Position::new(0, 20), &[Position::new(5, 10), Position::new(12, 15)]);
        assert_eq!(
            g,
            vec![Position::new(0, 5), Position::new(10, 12), Position::new(15, 20)]
        );
    }
}
