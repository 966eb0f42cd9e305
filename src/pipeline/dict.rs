//! Symbol dictionary loading for CTC decoding.

use std::path::Path;

use crate::core::constants::{DICT_BLANK_SYMBOL, DICT_SPACE_SYMBOL};
use crate::core::errors::{DriverError, DriverResult};

/// Loads the ordered symbol dictionary for a language.
///
/// The result is `[blank] + one symbol per file line, in file order +
/// [space]`: index 0 is the reserved CTC blank and the last index the
/// reserved space symbol. A missing file surfaces as `ResourceMissing`.
pub fn load_dictionary(path: &Path) -> DriverResult<Vec<String>> {
    if !path.is_file() {
        return Err(DriverError::ResourceMissing {
            path: path.to_path_buf(),
        });
    }
    let content = std::fs::read_to_string(path)?;

    let mut symbols = Vec::with_capacity(content.lines().count() + 2);
    symbols.push(DICT_BLANK_SYMBOL.to_string());
    symbols.extend(content.lines().map(|line| line.to_string()));
    symbols.push(DICT_SPACE_SYMBOL.to_string());
    Ok(symbols)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn blank_first_space_last_lines_between() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "a").unwrap();
        writeln!(file, "b").unwrap();
        writeln!(file, "c").unwrap();

        let dict = load_dictionary(file.path()).unwrap();
        assert_eq!(dict, vec!["#", "a", "b", "c", " "]);
    }

    #[test]
    fn missing_file_is_resource_missing() {
        let result = load_dictionary(Path::new("/nonexistent/dict.txt"));
        assert!(matches!(result, Err(DriverError::ResourceMissing { .. })));
    }

    #[test]
    fn empty_file_still_reserves_blank_and_space() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let dict = load_dictionary(file.path()).unwrap();
        assert_eq!(dict, vec!["#", " "]);
    }
}
