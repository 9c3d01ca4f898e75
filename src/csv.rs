//! CSV import for the base relations.
//!
//! Formats: `N: id,label`, `E: id,src,dst,label`, `NP|EP: id,key,value`.
//! UTF-8, optional header row, values containing commas or quotes are
//! double-quoted with `"` escaped as `""`. Every base relation starts with
//! a numeric identifier column, which is how a header row is recognized.

use std::fs;
use std::path::Path;

use crate::error::{Error, Result};

/// Parse one CSV line into fields, honoring quoting.
fn split_line(line: &str, lineno: usize) -> Result<Vec<String>> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut chars = line.chars().peekable();
    let mut in_quotes = false;

    while let Some(c) = chars.next() {
        if in_quotes {
            if c == '"' {
                if chars.peek() == Some(&'"') {
                    field.push('"');
                    chars.next();
                } else {
                    in_quotes = false;
                }
            } else {
                field.push(c);
            }
        } else {
            match c {
                '"' => in_quotes = true,
                ',' => {
                    fields.push(field.trim().to_string());
                    field.clear();
                }
                _ => field.push(c),
            }
        }
    }
    if in_quotes {
        return Err(Error::parse(lineno, 1, "unterminated quoted field"));
    }
    fields.push(field.trim().to_string());
    Ok(fields)
}

/// Read a CSV file into rows of fields, skipping an optional header row
/// (detected by a non-numeric first field) and blank lines.
pub fn read_rows(path: &Path, arity: usize) -> Result<Vec<Vec<String>>> {
    let content = fs::read_to_string(path)
        .map_err(|e| Error::Io(format!("{}: {e}", path.display())))?;
    let mut rows = Vec::new();
    for (idx, line) in content.lines().enumerate() {
        let lineno = idx + 1;
        if line.trim().is_empty() {
            continue;
        }
        let fields = split_line(line, lineno)?;
        if idx == 0 && fields.first().map(|f| f.parse::<i64>().is_err()).unwrap_or(true) {
            continue; // header row
        }
        if fields.len() != arity {
            return Err(Error::parse(
                lineno,
                1,
                format!("expected {arity} fields, found {}", fields.len()),
            ));
        }
        rows.push(fields);
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(content: &str) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.csv");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
        (dir, path)
    }

    #[test]
    fn test_plain_rows() {
        let (_dir, path) = write_file("1,Person\n2,Person\n");
        let rows = read_rows(&path, 2).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], vec!["1", "Person"]);
    }

    #[test]
    fn test_header_skipped() {
        let (_dir, path) = write_file("id,label\n1,Person\n");
        let rows = read_rows(&path, 2).unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn test_quoted_fields() {
        let (_dir, path) = write_file("1,name,\"Smith, \"\"Jo\"\"\"\n");
        let rows = read_rows(&path, 3).unwrap();
        assert_eq!(rows[0][2], "Smith, \"Jo\"");
    }

    #[test]
    fn test_arity_mismatch() {
        let (_dir, path) = write_file("1,Person,extra\n");
        assert!(matches!(read_rows(&path, 2), Err(Error::Parse { .. })));
    }

    #[test]
    fn test_unterminated_quote() {
        let (_dir, path) = write_file("1,\"broken\n");
        assert!(matches!(read_rows(&path, 2), Err(Error::Parse { .. })));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            read_rows(Path::new("/no/such/file.csv"), 2),
            Err(Error::Io(_))
        ));
    }
}
