//! Interactive file and mode selection
//!
//! Prompts go to stderr so stdout stays free; input is any `BufRead` so the
//! loops can be driven from tests.

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use clap::ValueEnum;

/// Workflow to run on the selected workbook
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    /// Fill the missing cells of the "A->B" sheet
    #[value(name = "a2b")]
    Fill,
    /// Order the "A ordonner" sheet into "Résultats"
    #[value(name = "order")]
    Order,
}

/// `.xlsx` files directly under `dir`, sorted by name
///
/// Office lock files (`~$name.xlsx`) are skipped.
pub fn list_excel_files(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file())
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("xlsx"))
        })
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| !name.starts_with("~$"))
        })
        .collect();
    files.sort();
    Ok(files)
}

/// 0-based index of a 1-based menu choice, if it is in `1..=len`
pub fn parse_choice(input: &str, len: usize) -> Option<usize> {
    match input.trim().parse::<usize>() {
        Ok(n) if (1..=len).contains(&n) => Some(n - 1),
        _ => None,
    }
}

fn read_answer<R: BufRead>(input: &mut R) -> io::Result<String> {
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "no input, selection cancelled",
        ));
    }
    Ok(line)
}

/// Ask for one of the workbooks in `dir` until a valid number is entered
///
/// An empty directory is listed again after Enter, so files can be dropped in
/// while the prompt waits.
pub fn pick_file<R: BufRead, W: Write>(dir: &Path, input: &mut R, out: &mut W) -> io::Result<PathBuf> {
    loop {
        let files = list_excel_files(dir)?;
        if files.is_empty() {
            write!(
                out,
                "No .xlsx file in {}. Add one and press Enter: ",
                dir.display()
            )?;
            out.flush()?;
            read_answer(input)?;
            continue;
        }

        writeln!(out, "Workbooks in {}:", dir.display())?;
        for (i, path) in files.iter().enumerate() {
            let name = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
            writeln!(out, "  {}. {name}", i + 1)?;
        }
        write!(out, "File number: ")?;
        out.flush()?;

        let answer = read_answer(input)?;
        match parse_choice(&answer, files.len()) {
            Some(index) => return Ok(files[index].clone()),
            None => writeln!(out, "Please enter a number between 1 and {}", files.len())?,
        }
    }
}

/// Ask for the workflow until `1` or `2` is entered
pub fn pick_mode<R: BufRead, W: Write>(input: &mut R, out: &mut W) -> io::Result<Mode> {
    loop {
        write!(out, "A->B (1) or A ordonner (2)? ")?;
        out.flush()?;

        match parse_choice(&read_answer(input)?, 2) {
            Some(0) => return Ok(Mode::Fill),
            Some(_) => return Ok(Mode::Order),
            None => writeln!(out, "Please enter 1 or 2")?,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Cursor;
    use tempfile::tempdir;

    #[test]
    fn test_parse_choice() {
        assert_eq!(parse_choice("1\n", 3), Some(0));
        assert_eq!(parse_choice(" 3 ", 3), Some(2));
        assert_eq!(parse_choice("0", 3), None);
        assert_eq!(parse_choice("4", 3), None);
        assert_eq!(parse_choice("two", 3), None);
        assert_eq!(parse_choice("", 3), None);
    }

    #[test]
    fn test_list_excel_files() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("b.xlsx"), b"").unwrap();
        fs::write(dir.path().join("a.XLSX"), b"").unwrap();
        fs::write(dir.path().join("~$a.xlsx"), b"").unwrap();
        fs::write(dir.path().join("notes.txt"), b"").unwrap();
        fs::create_dir(dir.path().join("sub.xlsx")).unwrap();

        let names: Vec<String> = list_excel_files(dir.path())
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.XLSX", "b.xlsx"]);
    }

    #[test]
    fn test_pick_file_reprompts_on_bad_input() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("first.xlsx"), b"").unwrap();
        fs::write(dir.path().join("second.xlsx"), b"").unwrap();

        let mut input = Cursor::new("x\n9\n2\n");
        let mut out = Vec::new();
        let picked = pick_file(dir.path(), &mut input, &mut out).unwrap();

        assert_eq!(picked, dir.path().join("second.xlsx"));
        let shown = String::from_utf8(out).unwrap();
        assert_eq!(shown.matches("File number: ").count(), 3);
        assert!(shown.contains("  1. first.xlsx"));
    }

    #[test]
    fn test_pick_file_empty_directory_until_eof() {
        let dir = tempdir().unwrap();
        let mut input = Cursor::new("\n");
        let mut out = Vec::new();

        let err = pick_file(dir.path(), &mut input, &mut out).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
        assert_eq!(String::from_utf8(out).unwrap().matches("No .xlsx file").count(), 2);
    }

    #[test]
    fn test_pick_mode() {
        let mut out = Vec::new();
        assert_eq!(pick_mode(&mut Cursor::new("3\n1\n"), &mut out).unwrap(), Mode::Fill);
        assert_eq!(pick_mode(&mut Cursor::new("2\n"), &mut out).unwrap(), Mode::Order);
        assert!(String::from_utf8(out).unwrap().contains("Please enter 1 or 2"));
    }
}
