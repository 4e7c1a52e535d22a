// Plain-text rendering of listings for the `ls` and `tree` subcommands.

use s3browse_rs::Listing;

/// Folders first, then files, one full key per line.
pub fn render_one_level(listing: &Listing) -> String {
    let mut out = String::new();
    for folder in &listing.folders {
        out.push_str(folder);
        out.push('\n');
    }
    for file in &listing.files {
        out.push_str(file);
        out.push('\n');
    }
    out
}

/// Indented tree below `prefix`. Every entry is shown by its last segment.
///
/// Entries are sorted by key, so the descendants of a folder directly follow
/// it.
pub fn render_tree(prefix: &str, listing: &Listing, delimiter: &str) -> String {
    let mut entries: Vec<&str> = listing
        .folders
        .iter()
        .chain(listing.files.iter())
        .map(String::as_str)
        .collect();
    entries.sort_unstable();

    let mut out = String::new();
    for entry in entries {
        let relative = entry.strip_prefix(prefix).unwrap_or(entry);
        let trimmed = if delimiter.is_empty() {
            relative
        } else {
            relative.strip_suffix(delimiter).unwrap_or(relative)
        };
        let (depth, name) = if delimiter.is_empty() {
            (0, trimmed)
        } else {
            (
                trimmed.matches(delimiter).count(),
                trimmed.rsplit(delimiter).next().unwrap_or(trimmed),
            )
        };

        out.push_str(&"  ".repeat(depth));
        out.push_str(name);
        if !delimiter.is_empty() && relative.ends_with(delimiter) {
            out.push_str(delimiter);
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing(folders: &[&str], files: &[&str]) -> Listing {
        Listing {
            folders: folders.iter().map(|s| s.to_string()).collect(),
            files: files.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn one_level_lists_folders_before_files() {
        let rendered = render_one_level(&listing(&["b/"], &["a.txt"]));
        assert_eq!(rendered, "b/\na.txt\n");
    }

    #[test]
    fn tree_indents_by_depth() {
        let rendered = render_tree(
            "media/",
            &listing(
                &["media/videos/", "media/videos/2024/"],
                &["media/top.txt", "media/videos/2024/a.mp4", "media/videos/b.mp4"],
            ),
            "/",
        );
        assert_eq!(
            rendered,
            "top.txt\nvideos/\n  2024/\n    a.mp4\n  b.mp4\n"
        );
    }

    #[test]
    fn tree_of_empty_listing_is_empty() {
        assert_eq!(render_tree("", &Listing::default(), "/"), "");
    }
}
