//! # Utility Functions Module
//!
//! Helpers for building argument vectors handed to external tools.
//! Arguments stay `OsString` so paths that are not valid UTF-8 survive
//! untouched and nothing is ever re-parsed by a shell.

use std::ffi::{OsStr, OsString};

/// Converts any iterable of `OsStr`-like items into owned arguments.
///
/// # Example
/// ```rust
/// use file_converter::utils::to_os_args;
/// use std::path::Path;
///
/// let input = Path::new("/videos/my clip.mp4");
/// let args = to_os_args([input.as_os_str(), "-vn".as_ref()]);
/// assert_eq!(args.len(), 2);
/// ```
pub fn to_os_args<T, I>(items: I) -> Vec<OsString>
where
    T: AsRef<OsStr>,
    I: IntoIterator<Item = T>,
{
    items.into_iter().map(|item| item.as_ref().to_os_string()).collect()
}

/// Renders arguments for logs, quoting the ones that contain whitespace
pub fn display_args(args: &[OsString]) -> String {
    args.iter()
        .map(|arg| {
            let text = arg.to_string_lossy();
            if text.chars().any(char::is_whitespace) {
                format!("\"{}\"", text)
            } else {
                text.into_owned()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Macro for even more convenient argument building.
///
/// Accepts anything that implements `AsRef<OsStr>` (string literals, `&Path`,
/// `String`, ...).
///
/// # Example
/// ```rust
/// use file_converter::os_args;
///
/// let crf = 23.to_string();
/// let args = os_args!["-crf", &crf, "-y"];
/// assert_eq!(args.len(), 3);
/// ```
#[macro_export]
macro_rules! os_args {
    [$($item:expr),* $(,)?] => {
        ::std::vec![$(::std::ffi::OsString::from(::std::convert::AsRef::<::std::ffi::OsStr>::as_ref($item))),*]
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_to_os_args_string_literals() {
        let result = to_os_args(["hello", "world"]);
        assert_eq!(result, vec![OsString::from("hello"), OsString::from("world")]);
    }

    #[test]
    fn test_to_os_args_empty() {
        let result = to_os_args(Vec::<&str>::new());
        assert!(result.is_empty());
    }

    #[test]
    fn test_os_args_macro_mixes_paths_and_strings() {
        let path = Path::new("/tmp/with space.mkv");
        let crf = 18.to_string();
        let result = os_args!["-crf", &crf, path];
        assert_eq!(
            result,
            vec![
                OsString::from("-crf"),
                OsString::from("18"),
                OsString::from("/tmp/with space.mkv"),
            ]
        );
    }

    #[test]
    fn test_display_args_quotes_whitespace() {
        let args = os_args!["-i", Path::new("/tmp/my clip.mp4"), "-y"];
        assert_eq!(display_args(&args), "-i \"/tmp/my clip.mp4\" -y");
    }
}
