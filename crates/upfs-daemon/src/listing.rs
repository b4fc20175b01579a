//! Listing collaborators notified when a refresh publishes.

use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};

use tempfile::NamedTempFile;
use upfs_store::Item;

/// Receives the full item collection, in no particular order, every time a
/// new snapshot is published.
pub trait ListingSink: Send + Sync {
    fn publish(&self, items: &[Arc<Item>]) -> io::Result<()>;
}

const HEAD: &str = r#"<!doctype html>
<html>
	<head>
		<meta charset="utf-8">
		<title>upfs</title>
		<style>
			body {
				font-family: monospace;
			}

			.file {
				margin: 10px;
				padding-bottom: 10px;
				display: flex;

				color: black;
				text-decoration: none;
			}

			.file:not(:last-child) {
				border-bottom: 1px lightgray solid;
			}

			.fname {
				width: 300px;
				margin-right: 10px;
				word-break: break-all;
			}

			.size {
				width: 100px;
			}
		</style>
	</head>
	<body>
"#;

const TAIL: &str = "\t</body>\n</html>\n";

/// HTML page listing every upload, newest first.
///
/// The rendered page is cached and served from [`HtmlListing::page`]; when
/// an output path is set it is also written there on every publish.
#[derive(Debug)]
pub struct HtmlListing {
    output: Option<PathBuf>,
    page: RwLock<Arc<str>>,
}

impl HtmlListing {
    pub fn new(output: Option<PathBuf>) -> Self {
        Self {
            output,
            page: RwLock::new(Arc::from(render(&[]))),
        }
    }

    /// The most recently rendered page
    pub fn page(&self) -> Arc<str> {
        Arc::clone(&self.page.read().unwrap_or_else(PoisonError::into_inner))
    }

    // Write next to the target and rename, so readers never see half a page
    fn write_output(&self, page: &str) -> io::Result<()> {
        let Some(path) = &self.output else {
            return Ok(());
        };
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => std::path::Path::new("."),
        };
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(page.as_bytes())?;
        tmp.persist(path).map_err(|e| e.error)?;
        Ok(())
    }
}

impl ListingSink for HtmlListing {
    fn publish(&self, items: &[Arc<Item>]) -> io::Result<()> {
        let page: Arc<str> = Arc::from(render(items));
        *self.page.write().unwrap_or_else(PoisonError::into_inner) = Arc::clone(&page);
        self.write_output(&page)
    }
}

/// Render the listing page, newest upload first
pub fn render(items: &[Arc<Item>]) -> String {
    let mut sorted: Vec<&Arc<Item>> = items.iter().collect();
    sorted.sort_by(|a, b| b.modified.cmp(&a.modified));

    let mut out = String::from(HEAD);
    for item in sorted {
        out.push_str(&format!(
            "\t\t<a class=\"file\" href=\"{}\">\n\
             \t\t\t<div class=\"fname\">{}</div>\n\
             \t\t\t<div class=\"size\">{}</div>\n\
             \t\t\t<div class=\"date\">{}</div>\n\
             \t\t</a>\n",
            escape(&item.url),
            escape(&item.name),
            escape(&item.size_string()),
            escape(&item.date_string()),
        ));
    }
    out.push_str(TAIL);
    out
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&#34;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
