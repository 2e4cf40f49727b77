//! # Utility Functions Module
//!
//! Helpers for building argument lists for external tools.

use crate::error::{CompressError, Result};
use std::path::Path;

/// Collect any iterable of displayable items into owned strings.
pub fn to_string_vec<T, I>(items: I) -> Vec<String>
where
    T: ToString,
    I: IntoIterator<Item = T>,
{
    items.into_iter().map(|item| item.to_string()).collect()
}

/// Path as a UTF-8 argument. Tools get the exact path or nothing.
pub fn path_arg(path: &Path) -> Result<String> {
    path.to_str()
        .map(str::to_string)
        .ok_or_else(|| CompressError::Validation(format!("Path is not valid UTF-8: {:?}", path)))
}

/// Build a `Vec<String>` of tool arguments from mixed displayable values.
///
/// ```rust,ignore
/// let crf = 30;
/// let args = args!["-crf", crf, "-preset", "ultrafast"];
/// ```
#[macro_export]
macro_rules! args {
    [$($item:expr),* $(,)?] => {
        $crate::utils::to_string_vec([$($item.to_string()),*])
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_args_macro_mixes_types() {
        let crf: u8 = 30;
        let threads: u32 = 1;
        let result = args!["-crf", crf, "-threads", threads];
        assert_eq!(result, vec!["-crf", "30", "-threads", "1"]);
    }

    #[test]
    fn test_to_string_vec_empty() {
        let result: Vec<String> = to_string_vec(Vec::<&str>::new());
        assert!(result.is_empty());
    }

    #[test]
    fn test_path_arg() {
        let path = PathBuf::from("/tmp/input clip.mov");
        assert_eq!(path_arg(&path).unwrap(), "/tmp/input clip.mov");
    }
}
