//! Line diffs for edit confirmations

/// Lines of context around the changed region
const CONTEXT: usize = 3;

/// Above this many cells the LCS table is skipped
const MAX_LCS_CELLS: usize = 4_000_000;

/// Render a single-hunk unified diff of `old` -> `new`
///
/// Empty when nothing changed.
pub fn unified_diff(path: &str, old: &str, new: &str) -> String {
    if old == new {
        return String::new();
    }

    // Terminators stay attached so a missing final newline is a change
    let old_lines: Vec<&str> = old.split_inclusive('\n').collect();
    let new_lines: Vec<&str> = new.split_inclusive('\n').collect();

    let prefix = old_lines
        .iter()
        .zip(&new_lines)
        .take_while(|(a, b)| a == b)
        .count();
    let max_suffix = old_lines.len().min(new_lines.len()) - prefix;
    let suffix = old_lines
        .iter()
        .rev()
        .zip(new_lines.iter().rev())
        .take(max_suffix)
        .take_while(|(a, b)| a == b)
        .count();

    let old_mid = &old_lines[prefix..old_lines.len() - suffix];
    let new_mid = &new_lines[prefix..new_lines.len() - suffix];

    let before_start = prefix.saturating_sub(CONTEXT);
    let after_start = old_lines.len() - suffix;
    let after_end = (after_start + CONTEXT).min(old_lines.len());

    let mut body: Vec<(char, &str)> = Vec::new();
    body.extend(old_lines[before_start..prefix].iter().map(|l| (' ', *l)));
    body.extend(diff_ops(old_mid, new_mid));
    body.extend(old_lines[after_start..after_end].iter().map(|l| (' ', *l)));

    let old_count = body.iter().filter(|(op, _)| *op != '+').count();
    let new_count = body.iter().filter(|(op, _)| *op != '-').count();

    let mut out = format!(
        "--- a/{path}\n+++ b/{path}\n@@ -{},{} +{},{} @@\n",
        before_start + 1,
        old_count,
        before_start + 1,
        new_count
    );
    for (op, line) in body {
        out.push(op);
        match line.strip_suffix('\n') {
            Some(text) => {
                out.push_str(text);
                out.push('\n');
            }
            None => {
                out.push_str(line);
                out.push_str("\n\\ No newline at end of file\n");
            }
        }
    }
    out
}

/// Minimal edit script between two line slices
fn diff_ops<'a>(old: &[&'a str], new: &[&'a str]) -> Vec<(char, &'a str)> {
    let (n, m) = (old.len(), new.len());
    if n == 0 || m == 0 || (n + 1) * (m + 1) > MAX_LCS_CELLS {
        let mut ops: Vec<(char, &str)> = old.iter().map(|l| ('-', *l)).collect();
        ops.extend(new.iter().map(|l| ('+', *l)));
        return ops;
    }

    // lcs[i][j] = LCS length of old[i..] and new[j..]
    let mut lcs = vec![0u32; (n + 1) * (m + 1)];
    let idx = |i: usize, j: usize| i * (m + 1) + j;
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            lcs[idx(i, j)] = if old[i] == new[j] {
                lcs[idx(i + 1, j + 1)] + 1
            } else {
                lcs[idx(i + 1, j)].max(lcs[idx(i, j + 1)])
            };
        }
    }

    let mut ops = Vec::with_capacity(n + m);
    let (mut i, mut j) = (0, 0);
    while i < n && j < m {
        if old[i] == new[j] {
            ops.push((' ', old[i]));
            i += 1;
            j += 1;
        } else if lcs[idx(i + 1, j)] >= lcs[idx(i, j + 1)] {
            ops.push(('-', old[i]));
            i += 1;
        } else {
            ops.push(('+', new[j]));
            j += 1;
        }
    }
    ops.extend(old[i..].iter().map(|l| ('-', *l)));
    ops.extend(new[j..].iter().map(|l| ('+', *l)));
    ops
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_change_is_empty() {
        assert_eq!(unified_diff("a", "same\n", "same\n"), "");
    }

    #[test]
    fn test_single_line_change_with_context() {
        let old = "1\n2\n3\n4\n5\n6\n7\n8\n";
        let new = "1\n2\n3\n4\nfive\n6\n7\n8\n";
        let diff = unified_diff("f.txt", old, new);

        assert!(diff.starts_with("--- a/f.txt\n+++ b/f.txt\n@@ -2,7 +2,7 @@\n"));
        assert!(diff.contains("-5\n+five\n"));
        assert!(diff.contains(" 4\n"));
        assert!(!diff.contains(" 1\n"));
    }

    #[test]
    fn test_new_file() {
        let diff = unified_diff("n.txt", "", "a\nb\n");
        assert!(diff.contains("@@ -1,0 +1,2 @@"));
        assert!(diff.ends_with("+a\n+b\n"));
    }

    #[test]
    fn test_trailing_newline_change_is_shown() {
        let diff = unified_diff("t.txt", "a\nb", "a\nb\n");
        assert_eq!(
            diff,
            "--- a/t.txt\n+++ b/t.txt\n@@ -1,2 +1,2 @@\n a\n-b\n\\ No newline at end of file\n+b\n"
        );

        let removed = unified_diff("t.txt", "a\n", "a");
        assert!(removed.contains("-a\n+a\n\\ No newline at end of file\n"));
    }

    #[test]
    fn test_interleaved_changes_use_lcs() {
        let diff = unified_diff("x", "a\nb\nc\nd\n", "a\nB\nc\nD\n");
        assert!(diff.contains("-b\n+B\n c\n-d\n+D\n"));
    }
}
