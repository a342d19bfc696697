use std::{
    ffi::OsString,
    fs::{DirBuilder, File},
    io::{BufRead, BufReader, BufWriter},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};

/// Creates a buffered writer around a file, creating parent directories as needed.
pub fn buf_writer<P>(path: P) -> Result<BufWriter<File>>
where P: AsRef<Path> {
    if let Some(parent) = path.as_ref().parent() {
        if !parent.as_os_str().is_empty() {
            DirBuilder::new().recursive(true).create(parent)?;
        }
    }
    let file = File::create(&path)
        .with_context(|| format!("Failed to create file '{}'", path.as_ref().display()))?;
    Ok(BufWriter::new(file))
}

/// Opens a file for buffered line reading.
pub fn buf_reader<P>(path: P) -> Result<BufReader<File>>
where P: AsRef<Path> {
    let file = File::open(&path)
        .with_context(|| format!("Failed to open file '{}'", path.as_ref().display()))?;
    Ok(BufReader::new(file))
}

/// Calls `f` with each line of `reader` and its 1-based line number.
/// Line endings (`\n` or `\r\n`) are stripped; invalid UTF-8 is replaced.
pub fn for_each_line<R, F>(mut reader: R, mut f: F) -> Result<()>
where
    R: BufRead,
    F: FnMut(usize, &str) -> Result<()>,
{
    let mut buf = Vec::new();
    let mut lineno = 0usize;
    loop {
        buf.clear();
        let read = reader.read_until(b'\n', &mut buf).context("File read failed")?;
        if read == 0 {
            break;
        }
        if buf.last() == Some(&b'\n') {
            buf.pop();
            if buf.last() == Some(&b'\r') {
                buf.pop();
            }
        }
        lineno += 1;
        f(lineno, &String::from_utf8_lossy(&buf))?;
    }
    Ok(())
}

/// `foo.lst` → `foo.compiled.lst`.
pub fn compiled_path(path: &Path) -> PathBuf {
    match path.extension() {
        Some(ext) => {
            let mut compiled = OsString::from("compiled.");
            compiled.push(ext);
            path.with_extension(compiled)
        }
        None => path.with_extension("compiled"),
    }
}

/// Whether `path` is itself an output of [`compiled_path`].
pub fn is_compiled_path(path: &Path) -> bool {
    path.file_stem()
        .and_then(|stem| Path::new(stem).extension())
        .is_some_and(|ext| ext == "compiled")
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn test_for_each_line() {
        let mut lines = vec![];
        for_each_line(Cursor::new(b"a\r\nb\n\nc\xFF".to_vec()), |lineno, line| {
            lines.push((lineno, line.to_string()));
            Ok(())
        })
        .unwrap();
        assert_eq!(lines, vec![
            (1, "a".to_string()),
            (2, "b".to_string()),
            (3, String::new()),
            (4, "c\u{FFFD}".to_string()),
        ]);
    }

    #[test]
    fn test_compiled_path() {
        assert_eq!(compiled_path(Path::new("dump/libil2cpp.lst")), Path::new("dump/libil2cpp.compiled.lst"));
        assert_eq!(compiled_path(Path::new("main.c")), Path::new("main.compiled.c"));
        assert_eq!(compiled_path(Path::new("trace")), Path::new("trace.compiled"));
        assert!(is_compiled_path(Path::new("dump/libil2cpp.compiled.lst")));
        assert!(!is_compiled_path(Path::new("dump/libil2cpp.lst")));
    }
}
