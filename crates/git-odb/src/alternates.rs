//! Alternates rejection.
//!
//! `objects/info/alternates` and `objects/info/http-alternates` let C git
//! chain into other object directories. This resolver does not support
//! chaining into alternates; a repository that uses either file fails to
//! open with a descriptive error instead.

use std::fs;
use std::path::Path;

use crate::OdbError;

/// Fail if `objects_dir` declares any alternates.
///
/// A file that exists but contains only blank lines and `#` comments does
/// not count — that matches C git's own parsing, which would chain into
/// zero alternates in that case.
pub fn reject_if_present(objects_dir: &Path) -> Result<(), OdbError> {
    for name in ["alternates", "http-alternates"] {
        let path = objects_dir.join("info").join(name);
        if has_content(&path)? {
            return Err(OdbError::Unsupported(format!(
                "{} is not supported (alternate object databases are rejected)",
                path.display()
            )));
        }
    }
    Ok(())
}

fn has_content(path: &Path) -> Result<bool, OdbError> {
    if !path.is_file() {
        return Ok(false);
    }
    let content = fs::read_to_string(path)?;
    Ok(content
        .lines()
        .any(|line| {
            let line = line.trim();
            !line.is_empty() && !line.starts_with('#')
        }))
}
