use std::collections::BTreeMap;

/// Fixed archive entry name readers look up for the metadata document.
pub const COMIC_INFO_ENTRY: &str = "ComicInfo.xml";

/// First page of a chapter within the flattened archive page sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bookmark {
    /// 0-based global page index.
    pub page_index: usize,
    pub title: String,
}

/// Renders `ComicInfo.xml` with one `<Page>` per archive image.
///
/// Pages at a bookmark index carry the chapter title; the first bookmark is
/// typed `FrontCover`, later ones `Story`. If two bookmarks share an index the
/// first one wins.
pub fn render_comic_info(title: &str, bookmarks: &[Bookmark], total_pages: usize) -> Vec<u8> {
    let title = escape_text(title);

    let mut out = String::new();
    out.push_str("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n");
    out.push_str(
        "<ComicInfo xmlns:xsd=\"http://www.w3.org/2001/XMLSchema\" xmlns:xsi=\"http://www.w3.org/2001/XMLSchema-instance\">\n",
    );
    out.push_str(&format!("  <Series>{title}</Series>\n"));
    out.push_str(&format!("  <Title>{title}</Title>\n"));
    out.push_str(&format!("  <PageCount>{total_pages}</PageCount>\n"));
    out.push_str("  <Pages>\n");

    let mut by_index: BTreeMap<usize, &str> = BTreeMap::new();
    for bookmark in bookmarks {
        by_index
            .entry(bookmark.page_index)
            .or_insert(bookmark.title.as_str());
    }
    let cover_index = bookmarks.first().map(|b| b.page_index);

    for index in 0..total_pages {
        match by_index.get(&index) {
            Some(label) => {
                let page_type = if Some(index) == cover_index {
                    "FrontCover"
                } else {
                    "Story"
                };
                out.push_str(&format!(
                    "    <Page Image=\"{index}\" Bookmark=\"{}\" Type=\"{page_type}\" />\n",
                    escape_attr(label)
                ));
            }
            None => out.push_str(&format!("    <Page Image=\"{index}\" />\n")),
        }
    }

    out.push_str("  </Pages>\n");
    out.push_str("</ComicInfo>\n");
    out.into_bytes()
}

fn escape_text(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn escape_attr(input: &str) -> String {
    escape_text(input).replace('"', "&quot;")
}
