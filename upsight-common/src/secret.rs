//! File-based secrets (Docker/Kubernetes style mounted secret files).

use std::path::Path;

use crate::error::{Error, Result};

/// Read a secret from a file, stripping the trailing line break.
pub fn read_secret_file(path: impl AsRef<Path>) -> Result<String> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| Error::Secret {
        path: path.display().to_string(),
        source,
    })?;

    Ok(content.trim_end_matches(['\r', '\n']).to_string())
}

/// Resolve a password from an inline value and an optional secret file.
///
/// The file wins when both are present. Empty values resolve to `None`.
pub fn resolve_password(inline: Option<&str>, file: Option<&Path>) -> Result<Option<String>> {
    let password = match file {
        Some(path) => Some(read_secret_file(path)?),
        None => inline.map(str::to_string),
    };

    Ok(password.filter(|p| !p.is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_read_secret_strips_newline() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "s3cret pass").unwrap();

        assert_eq!(read_secret_file(file.path()).unwrap(), "s3cret pass");
    }

    #[test]
    fn test_file_takes_precedence() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "from-file").unwrap();

        let resolved = resolve_password(Some("inline"), Some(file.path())).unwrap();
        assert_eq!(resolved.as_deref(), Some("from-file"));
    }

    #[test]
    fn test_inline_and_empty() {
        assert_eq!(
            resolve_password(Some("inline"), None).unwrap().as_deref(),
            Some("inline")
        );
        assert_eq!(resolve_password(Some(""), None).unwrap(), None);
        assert_eq!(resolve_password(None, None).unwrap(), None);
    }

    #[test]
    fn test_missing_file_is_error() {
        let result = resolve_password(None, Some(Path::new("/nonexistent/secret")));
        assert!(matches!(result, Err(Error::Secret { .. })));
    }
}
