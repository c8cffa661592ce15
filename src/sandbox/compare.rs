/// Canonical form used for pass/fail: `\n` line endings, no trailing
/// whitespace on any line, no trailing blank lines. Leading whitespace counts.
pub(crate) fn normalize_output(raw: &str) -> String {
    let unified = raw.replace("\r\n", "\n").replace('\r', "\n");
    let lines: Vec<&str> = unified.split('\n').map(str::trim_end).collect();
    let end = lines.iter().rposition(|line| !line.is_empty()).map_or(0, |index| index + 1);
    lines[..end].join("\n")
}

pub(crate) fn outputs_match(actual: &str, expected: &str) -> bool {
    normalize_output(actual) == normalize_output(expected)
}
