use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};

use super::{DataSource, DatasetEntry, FetchError, RawRows};
use crate::pivot::DatasetId;

/// Serves every `*.csv` below a root directory. Ids follow sorted relative
/// path order, so they are stable as long as the file set is.
pub struct DirSource {
    root: PathBuf,
}

impl DirSource {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn scan(&self) -> io::Result<Vec<PathBuf>> {
        let mut found = Vec::new();
        collect_csv(&self.root, &mut found)?;
        let mut rel: Vec<PathBuf> = found
            .into_iter()
            .filter_map(|p| p.strip_prefix(&self.root).ok().map(Path::to_path_buf))
            .collect();
        rel.sort();
        Ok(rel)
    }

    fn resolve(&self, id: DatasetId) -> Result<PathBuf, FetchError> {
        let files = self.scan()?;
        files
            .get(id as usize)
            .map(|p| p.to_path_buf())
            .ok_or(FetchError::UnknownDataset(id))
    }
}

fn collect_csv(dir: &Path, out: &mut Vec<PathBuf>) -> io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_csv(&path, out)?;
        } else if path.extension().and_then(|e| e.to_str()) == Some("csv") {
            out.push(path);
        }
    }
    Ok(())
}

/// Splits one CSV line, honouring double-quoted cells and `""` escapes.
pub fn split_csv_line(line: &str) -> Vec<String> {
    let mut cells = Vec::new();
    let mut cell = String::new();
    let mut quoted = false;
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        match (c, quoted) {
            ('"', true) if chars.peek() == Some(&'"') => {
                cell.push('"');
                chars.next();
            }
            ('"', _) => quoted = !quoted,
            (',', false) => cells.push(std::mem::take(&mut cell)),
            _ => cell.push(c),
        }
    }
    cells.push(cell);
    cells
}

fn read_csv(path: &Path) -> io::Result<(Vec<String>, Vec<Vec<String>>)> {
    let reader = BufReader::new(File::open(path)?);
    let mut header: Vec<String> = Vec::new();
    let mut rows = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let trimmed = line.trim_end_matches(['\r', '\n']);
        if trimmed.trim().is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let cells = split_csv_line(trimmed);
        if header.is_empty() {
            header = cells.into_iter().map(|c| c.trim().to_string()).collect();
        } else {
            rows.push(cells);
        }
    }
    Ok((header, rows))
}

pub fn file_sha256(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

async fn blocking<T, F>(f: F) -> Result<T, FetchError>
where
    F: FnOnce() -> Result<T, FetchError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| FetchError::Io(io::Error::new(io::ErrorKind::Other, e)))?
}

#[async_trait]
impl DataSource for DirSource {
    async fn list(&self) -> Result<Vec<DatasetEntry>, FetchError> {
        let files = self.scan()?;
        Ok(files
            .into_iter()
            .enumerate()
            .map(|(i, p)| DatasetEntry {
                id: i as DatasetId,
                path: p.to_string_lossy().into_owned(),
            })
            .collect())
    }

    async fn fetch_rows(&self, id: DatasetId) -> Result<RawRows, FetchError> {
        let rel = self.resolve(id)?;
        let full = self.root.join(&rel);
        let (headers, rows) = blocking(move || read_csv(&full).map_err(FetchError::from)).await?;
        Ok(RawRows {
            path: rel.to_string_lossy().into_owned(),
            headers,
            rows,
        })
    }

    async fn cache_token(&self, id: DatasetId) -> Result<String, FetchError> {
        let full = self.root.join(self.resolve(id)?);
        blocking(move || file_sha256(&full).map_err(FetchError::from)).await
    }
}
