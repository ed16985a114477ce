use anyhow::{Context, Result};
use chrono::Local;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

const NOTES_FILE_NAME: &str = "tech_news_notes.md";

/// Markdown scratchpad shared by the digest workers, organised in `## section`s
#[derive(Debug, Clone)]
pub struct NotesFile {
    path: PathBuf,
}

impl NotesFile {
    /// Opens the notes file in `dir`, creating both with a dated header when missing
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir).with_context(|| format!("Failed to create notes directory {}", dir.display()))?;

        let path = dir.join(NOTES_FILE_NAME);
        if !path.exists() {
            let header = format!("# Tech News Notes - {}\n\n", Local::now().format("%Y-%m-%d %H:%M:%S"));
            fs::write(&path, header).with_context(|| format!("Failed to create notes file {}", path.display()))?;
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn read(&self) -> Result<String> {
        fs::read_to_string(&self.path).with_context(|| format!("Failed to read notes file {}", self.path.display()))
    }

    /// Inserts `content` right under an existing `## section` header, or appends a new section
    pub fn write(&self, section: &str, content: &str) -> Result<()> {
        let existing = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e).with_context(|| format!("Failed to read notes file {}", self.path.display())),
        };

        let header = format!("## {}", section);
        let mut updated = String::with_capacity(existing.len() + content.len() + header.len() + 8);
        let mut inserted = false;
        for line in existing.lines() {
            updated.push_str(line);
            updated.push('\n');
            if !inserted && line == header {
                updated.push_str(&format!("\n{}\n\n", content));
                inserted = true;
            }
        }
        if !inserted {
            updated.push_str(&format!("\n{}\n\n{}\n\n", header, content));
        }

        fs::write(&self.path, updated).with_context(|| format!("Failed to write notes file {}", self.path.display()))
    }
}

fn is_section_header(line: &str) -> bool {
    line == "##" || line.starts_with("## ")
}

/// Body of the first `## section` in `notes`, up to the next level-2 header.
/// Deeper headers (`###`) belong to the section.
pub fn extract_section(notes: &str, section: &str) -> Option<String> {
    let header = format!("## {}", section);
    let body: Vec<&str> = notes
        .lines()
        .skip_while(|line| line.trim_end() != header)
        .skip(1)
        .take_while(|line| !is_section_header(line))
        .collect();

    let body = body.join("\n");
    let body = body.trim();
    (!body.is_empty()).then(|| body.to_string())
}

/// Pushes level-2 headers in `content` down one level so it can live inside a section
pub fn demote_section_headers(content: &str) -> String {
    content
        .lines()
        .map(|line| if is_section_header(line) { format!("#{}", line) } else { line.to_string() })
        .collect::<Vec<_>>()
        .join("\n")
}
