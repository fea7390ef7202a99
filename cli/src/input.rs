use std::{
    fs::File,
    io::Read,
    path::Path,
};

use anyhow::Context;

/// Reads the whole note from `file`, or from stdin when there's no file
pub fn read_note(file: Option<&Path>) -> anyhow::Result<String> {
    match file {
        Some(path) => read_from(
            File::open(path).with_context(|| format!("Can't open {}", path.display()))?,
        ),
        None => read_from(std::io::stdin().lock()),
    }
}

fn read_from<R: Read>(mut reader: R) -> anyhow::Result<String> {
    let mut text = String::new();
    reader.read_to_string(&mut text)?;
    Ok(text)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::{read_from, read_note};

    #[test]
    fn reads_a_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "# Order 739\n\nClass III devices").unwrap();

        let note = read_note(Some(file.path())).unwrap();

        assert_eq!("# Order 739\n\nClass III devices", note);
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = read_note(Some(dir.path().join("nope.md").as_path()));
        assert!(result.is_err());
    }

    #[test]
    fn reads_any_reader() {
        let note = read_from("from a reader".as_bytes()).unwrap();
        assert_eq!("from a reader", note);
    }
}
