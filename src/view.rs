//! HTML pages.
//!
//! Plain string building over data produced by the core. Everything that
//! came from the filesystem or the client is escaped before it is written.

use std::fmt::Write as _;
use std::path::Path;

use crate::listing::{FileKind, Listing};
use crate::storage::StorageRoots;

const STYLE: &str = "body{font-family:system-ui,-apple-system,'Segoe UI',Roboto,sans-serif;margin:0;background:#f5f6f8;color:#1f2933}\
header{display:flex;align-items:center;justify-content:space-between;padding:.75em 1.25em;background:#1f2933;color:#fff}\
header a{color:#cbd2d9;text-decoration:none;margin-left:1em}\
main{max-width:960px;margin:1.5em auto;padding:0 1em}\
table{width:100%;border-collapse:collapse;background:#fff}\
td,th{padding:.5em .75em;border-bottom:1px solid #e4e7eb;text-align:left}\
td.size,td.modified{color:#616e7c;white-space:nowrap}\
a{color:#0b69a3}\
.roots a{margin-right:1em}\
.card{background:#fff;padding:1em;margin:1em 0;border:1px solid #e4e7eb}\
.error{color:#ab091e}\
form.login{max-width:320px;margin:4em auto;background:#fff;padding:2em;border:1px solid #e4e7eb}\
form.login input{display:block;width:100%;margin:.5em 0 1em;padding:.5em;box-sizing:border-box}";

/// Modification times are shown in UTC.
const MODIFIED_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Escape text for use in HTML content and double-quoted attributes.
pub fn html_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn path_query(path: &Path) -> String {
    urlencoding::encode(&path.to_string_lossy()).into_owned()
}

fn page(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html><html><head><meta charset=\"utf-8\">\
<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\
<title>{}</title><style>{}</style></head><body>{}</body></html>",
        html_escape(title),
        STYLE,
        body
    )
}

/// The login form, optionally with a (generic) error message.
pub fn login_page(error: Option<&str>) -> String {
    let mut body = String::new();
    body.push_str("<form class=\"login\" method=\"post\" action=\"/login\">");
    body.push_str("<h2>File Share</h2>");
    if let Some(error) = error {
        let _ = write!(body, "<p class=\"error\">{}</p>", html_escape(error));
    }
    body.push_str("<label>Username<input name=\"username\" autocomplete=\"username\" required></label>");
    body.push_str(
        "<label>Password<input name=\"password\" type=\"password\" autocomplete=\"current-password\" required></label>",
    );
    body.push_str("<button type=\"submit\">Log in</button>");
    body.push_str("</form>");
    page("Login", &body)
}

fn kind_icon(kind: FileKind) -> &'static str {
    match kind {
        FileKind::Directory => "📁",
        FileKind::Image => "🖼️",
        FileKind::Video => "🎬",
        FileKind::Audio => "🎵",
        FileKind::Document => "📄",
        FileKind::Archive => "📦",
        FileKind::Other => "📎",
    }
}

fn header_bar(body: &mut String) {
    body.push_str("<header><strong>File Share</strong><nav>");
    body.push_str("<a href=\"/browse\">Home</a>");
    body.push_str("<a href=\"/logout\">Log out</a>");
    body.push_str("</nav></header>");
}

/// A directory listing with navigation and the upload form.
pub fn browse_page(listing: &Listing, roots: &StorageRoots) -> String {
    let mut body = String::new();
    header_bar(&mut body);
    body.push_str("<main>");

    body.push_str("<div class=\"roots\">");
    for root in roots.iter() {
        let _ = write!(
            body,
            "<a href=\"/browse?path={}\">{}</a>",
            path_query(&root.path),
            html_escape(&root.name)
        );
    }
    body.push_str("</div>");

    let _ = write!(
        body,
        "<h2>{}</h2>",
        html_escape(&listing.path.to_string_lossy())
    );

    // Field order matters: `path` must precede the files.
    let _ = write!(
        body,
        "<form class=\"card\" method=\"post\" action=\"/upload\" enctype=\"multipart/form-data\">\
<input type=\"hidden\" name=\"path\" value=\"{}\">\
<input type=\"file\" name=\"file\" multiple required> <button type=\"submit\">Upload</button></form>",
        html_escape(&listing.path.to_string_lossy())
    );

    body.push_str("<table><thead><tr><th>Name</th><th>Size</th><th>Modified</th></tr></thead><tbody>");

    if let Some(parent) = &listing.parent {
        let _ = write!(
            body,
            "<tr><td><a href=\"/browse?path={}\">⬆️ ..</a></td><td></td><td></td></tr>",
            path_query(parent)
        );
    }

    for entry in &listing.entries {
        let route = if entry.is_dir { "browse" } else { "download" };
        let _ = write!(
            body,
            "<tr><td>{} <a href=\"/{}?path={}\">{}</a></td><td class=\"size\">{}</td><td class=\"modified\" data-epoch=\"{}\">{}</td></tr>",
            kind_icon(entry.kind),
            route,
            path_query(&entry.path),
            html_escape(&entry.name),
            entry.display_size(),
            entry.modified.map(|t| t.timestamp()).unwrap_or_default(),
            entry
                .modified
                .map(|t| t.format(MODIFIED_FORMAT).to_string())
                .unwrap_or_default(),
        );
    }

    if listing.entries.is_empty() {
        body.push_str("<tr><td colspan=\"3\"><em>Empty folder</em></td></tr>");
    }

    body.push_str("</tbody></table></main>");
    page(&listing.path.to_string_lossy(), &body)
}

/// A minimal page for failures on browser routes.
pub fn error_page(status: u16, message: &str) -> String {
    let mut body = String::new();
    header_bar(&mut body);
    let _ = write!(
        body,
        "<main><div class=\"card\"><h2>Error {}</h2><p class=\"error\">{}</p>\
<p><a href=\"/browse\">Back to files</a></p></div></main>",
        status,
        html_escape(message)
    );
    page("Error", &body)
}
