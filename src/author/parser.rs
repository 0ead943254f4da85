//! Parser for the mailmap-style authors file.

use crate::error::AuthorError;

/// One `Display Name <email>` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedAuthor {
    pub name: String,
    pub email: String,
}

/// Parse an authors file.
///
/// Blank lines and lines starting with `#` are skipped; a `#` after the
/// closing bracket starts a trailing comment.
///
/// # Errors
///
/// Returns an error for a line missing either angle bracket, or where a
/// bracket only appears inside a comment.
pub fn parse(input: &str) -> std::result::Result<Vec<ParsedAuthor>, AuthorError> {
    let mut parsed = Vec::new();

    for (i, line) in input.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let comment = line.find('#');

        let begin = match line.find('<') {
            Some(b) if comment.map_or(true, |c| b < c) => b,
            _ => {
                return Err(AuthorError::Parse {
                    line: i + 1,
                    reason: format!("expected opening angle bracket in line '{line}'"),
                })
            }
        };
        let end = match line.rfind('>') {
            Some(e) if e > begin && comment.map_or(true, |c| e < c) => e,
            _ => {
                return Err(AuthorError::Parse {
                    line: i + 1,
                    reason: format!("expected closing angle bracket in line '{line}'"),
                })
            }
        };

        parsed.push(ParsedAuthor {
            name: line[..begin].trim().to_string(),
            email: line[begin + 1..end].trim().to_string(),
        });
    }
    Ok(parsed)
}
