//! FileCheck-style validation of IR and C dumps.
//!
//! Directives are written as comment lines, `; CHECK: pattern` or
//! `// CHECK: pattern`, and matched as substrings against the output in
//! order, the way LLVM's FileCheck does for plain patterns.

/// A directive extracted from check text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckDirective {
    /// CHECK: pattern - Match on this or a later line
    Check(String),
    /// CHECK-LABEL: pattern - Start of a section
    CheckLabel(String),
    /// CHECK-NEXT: pattern - Match on the line right after the previous match
    CheckNext(String),
    /// CHECK-NOT: pattern - Must not occur before the next positive match
    CheckNot(String),
    /// CHECK-EMPTY - Next line is empty
    CheckEmpty,
    /// COM: comment - Ignored
    Comment(String),
}

const PREFIXES: [&str; 2] = [";", "//"];

/// Parse every directive in `text`; other lines are ignored.
pub fn parse_directives(text: &str) -> Vec<CheckDirective> {
    text.lines().filter_map(parse_line).collect()
}

fn parse_line(line: &str) -> Option<CheckDirective> {
    let trimmed = line.trim();
    let body = PREFIXES
        .iter()
        .find_map(|prefix| trimmed.strip_prefix(prefix))?
        .trim_start();

    let directive = if let Some(rest) = body.strip_prefix("CHECK-LABEL:") {
        CheckDirective::CheckLabel(rest.trim().to_string())
    } else if let Some(rest) = body.strip_prefix("CHECK-NEXT:") {
        CheckDirective::CheckNext(rest.trim().to_string())
    } else if let Some(rest) = body.strip_prefix("CHECK-NOT:") {
        CheckDirective::CheckNot(rest.trim().to_string())
    } else if body.starts_with("CHECK-EMPTY") {
        CheckDirective::CheckEmpty
    } else if let Some(rest) = body.strip_prefix("CHECK:") {
        CheckDirective::Check(rest.trim().to_string())
    } else if let Some(rest) = body.strip_prefix("COM:") {
        CheckDirective::Comment(rest.trim().to_string())
    } else {
        return None;
    };
    Some(directive)
}

/// Validate `output` against `directives`.
pub fn check_output(output: &str, directives: &[CheckDirective]) -> Result<(), String> {
    let lines: Vec<&str> = output.lines().collect();
    let mut line_idx = 0;
    let mut pending_not: Vec<&str> = Vec::new();

    for directive in directives {
        match directive {
            CheckDirective::Comment(_) => continue,

            CheckDirective::CheckNot(pattern) => pending_not.push(pattern.as_str()),

            CheckDirective::Check(pattern) | CheckDirective::CheckLabel(pattern) => {
                let found = lines
                    .iter()
                    .skip(line_idx)
                    .position(|line| line.contains(pattern.as_str()));
                let Some(offset) = found else {
                    return Err(format!("{}: pattern '{}' not found", name(directive), pattern));
                };
                check_absent(&lines[line_idx..line_idx + offset], &pending_not, line_idx)?;
                pending_not.clear();
                line_idx += offset + 1;
                log::trace!("{}: '{}' found at line {}", name(directive), pattern, line_idx - 1);
            }

            CheckDirective::CheckNext(pattern) => {
                let Some(line) = lines.get(line_idx) else {
                    return Err(format!("CHECK-NEXT: no more lines, expected '{}'", pattern));
                };
                if !line.contains(pattern.as_str()) {
                    return Err(format!(
                        "CHECK-NEXT: expected '{}' but got '{}'",
                        pattern, line
                    ));
                }
                pending_not.clear();
                line_idx += 1;
            }

            CheckDirective::CheckEmpty => {
                // end of output counts as empty
                let Some(line) = lines.get(line_idx) else {
                    continue;
                };
                if !line.trim().is_empty() {
                    return Err(format!("CHECK-EMPTY: expected empty line but got '{}'", line));
                }
                pending_not.clear();
                line_idx += 1;
            }
        }
    }

    check_absent(&lines[line_idx.min(lines.len())..], &pending_not, line_idx)
}

/// Parse directives out of `check_text` and validate `output` against them.
pub fn check(output: &str, check_text: &str) -> Result<(), String> {
    let directives = parse_directives(check_text);
    if directives.is_empty() {
        return Err("no CHECK directives found".to_string());
    }
    check_output(output, &directives)
}

fn check_absent(lines: &[&str], patterns: &[&str], first: usize) -> Result<(), String> {
    for (offset, line) in lines.iter().enumerate() {
        if let Some(pattern) = patterns.iter().find(|p| line.contains(*p)) {
            return Err(format!(
                "CHECK-NOT: pattern '{}' found at line {}: '{}'",
                pattern,
                first + offset,
                line
            ));
        }
    }
    Ok(())
}

fn name(directive: &CheckDirective) -> &'static str {
    match directive {
        CheckDirective::CheckLabel(_) => "CHECK-LABEL",
        _ => "CHECK",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_directives() {
        let content = r#"; CHECK-LABEL: proc 0
; CHECK-NEXT: L0
// CHECK-NOT: LoadGlobal
; COM: a comment
; CHECK-EMPTY
; not a directive
int x;"#;

        let directives = parse_directives(content);
        assert_eq!(
            directives,
            vec![
                CheckDirective::CheckLabel("proc 0".to_string()),
                CheckDirective::CheckNext("L0".to_string()),
                CheckDirective::CheckNot("LoadGlobal".to_string()),
                CheckDirective::Comment("a comment".to_string()),
                CheckDirective::CheckEmpty,
            ]
        );
    }

    #[test]
    fn test_check_matching() {
        let output = "define proc 0\nL0\n    Mov\n\nL1\n";
        let directives = vec![
            CheckDirective::CheckLabel("proc 0".to_string()),
            CheckDirective::CheckNext("L0".to_string()),
            CheckDirective::Check("Mov".to_string()),
            CheckDirective::CheckEmpty,
            CheckDirective::CheckNext("L1".to_string()),
        ];
        assert!(check_output(output, &directives).is_ok());
    }

    #[test]
    fn test_check_next_failure() {
        let output = "L0\n    Mov\n    Ret\n";
        let directives = vec![
            CheckDirective::Check("L0".to_string()),
            CheckDirective::CheckNext("Ret".to_string()),
        ];
        let err = check_output(output, &directives).unwrap_err();
        assert!(err.contains("expected 'Ret'"));
    }

    #[test]
    fn test_check_not_is_bounded_by_next_match() {
        let output = "L0\n    Br\nL2\n    LoadGlobal\n";
        let ok = "; CHECK: L0\n; CHECK-NOT: LoadGlobal\n; CHECK: L2\n";
        assert!(check(output, ok).is_ok());

        let trailing = "; CHECK: L2\n; CHECK-NOT: LoadGlobal\n";
        let err = check(output, trailing).unwrap_err();
        assert!(err.contains("CHECK-NOT"));
    }

    #[test]
    fn test_missing_pattern() {
        assert!(check("L0\n", "; CHECK: L7\n").is_err());
        assert!(check("L0\n", "no directives here").is_err());
    }
}
