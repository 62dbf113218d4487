//! Pure version-selection policy shared by every plugin source.

use semver::{Version, VersionReq};

use crate::UpdateError;

/// Picks the winning candidate out of a source's version listing.
///
/// Without a range the first entry wins: every catalog we speak to lists
/// newest first, so "first" is the source's own definition of latest. With a
/// range, candidates that do not parse as semver are silently excluded and
/// the maximum satisfying version wins.
pub fn pick_version<'a, T>(
    items: &'a [T],
    version_of: impl Fn(&T) -> &str,
    range: Option<&VersionReq>,
) -> Result<&'a T, UpdateError> {
    if items.is_empty() {
        return Err(UpdateError::NotFound("no versions published".to_string()));
    }
    let Some(range) = range else {
        return Ok(&items[0]);
    };

    let mut best: Option<(&T, Version)> = None;
    for item in items {
        let Ok(version) = Version::parse(version_of(item)) else {
            continue;
        };
        if !range.matches(&version) {
            continue;
        }
        match &best {
            Some((_, current)) if *current >= version => {}
            _ => best = Some((item, version)),
        }
    }

    best.map(|(item, _)| item)
        .ok_or_else(|| UpdateError::NotFound(format!("no version matching {range}")))
}

/// Chooses one artifact when a version ships several build variants.
///
/// The variant name is the substring between the longest common prefix and
/// the longest common suffix of all filenames, compared case-insensitively.
/// Priority: paper > spigot > bukkit > the file flagged primary > the
/// empty variant > first listed. Must not require inspecting file contents.
pub fn select_artifact<'a, T>(
    files: &'a [T],
    name_of: impl Fn(&T) -> &str,
    is_primary: impl Fn(&T) -> bool,
) -> &'a T {
    if files.len() == 1 {
        return &files[0];
    }

    let names: Vec<&[u8]> = files.iter().map(|file| name_of(file).as_bytes()).collect();
    let mut prefix = names[0].len();
    let mut suffix = names[0].len();
    for name in &names[1..] {
        prefix = prefix.min(common_prefix_len(names[0], name));
        suffix = suffix.min(common_suffix_len(names[0], name));
    }

    let variants: Vec<String> = names
        .iter()
        .map(|name| {
            let end = name.len().saturating_sub(suffix);
            let start = prefix.min(end);
            String::from_utf8_lossy(&name[start..end]).to_lowercase()
        })
        .collect();

    for wanted in ["paper", "spigot", "bukkit"] {
        if let Some(idx) = variants.iter().position(|variant| variant == wanted) {
            return &files[idx];
        }
    }
    if let Some(idx) = files.iter().position(|file| is_primary(file)) {
        return &files[idx];
    }
    if let Some(idx) = variants.iter().position(|variant| variant.is_empty()) {
        return &files[idx];
    }
    &files[0]
}

fn common_prefix_len(left: &[u8], right: &[u8]) -> usize {
    left.iter().zip(right).take_while(|(a, b)| a == b).count()
}

fn common_suffix_len(left: &[u8], right: &[u8]) -> usize {
    left.iter()
        .rev()
        .zip(right.iter().rev())
        .take_while(|(a, b)| a == b)
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_range_takes_first_entry() {
        let versions = ["2.1.0", "2.0.0", "1.9.0"];
        let picked = pick_version(&versions, |v| *v, None).unwrap();
        assert_eq!(*picked, "2.1.0");
    }

    #[test]
    fn empty_listing_is_not_found() {
        let versions: [&str; 0] = [];
        assert!(matches!(
            pick_version(&versions, |v| *v, None),
            Err(UpdateError::NotFound(_))
        ));
    }

    #[test]
    fn range_selects_maximum_satisfying() {
        let versions = ["1.0.0", "1.2.0", "2.0.0"];
        let range = VersionReq::parse("^1").unwrap();
        let picked = pick_version(&versions, |v| *v, Some(&range)).unwrap();
        assert_eq!(*picked, "1.2.0");
    }

    #[test]
    fn range_with_no_match_is_not_found() {
        let versions = ["1.0.0", "1.2.0"];
        let range = VersionReq::parse("^3").unwrap();
        assert!(matches!(
            pick_version(&versions, |v| *v, Some(&range)),
            Err(UpdateError::NotFound(_))
        ));
    }

    #[test]
    fn unparseable_candidates_are_skipped() {
        let versions = ["build-47", "1.5.0", "nightly"];
        let range = VersionReq::parse(">=1").unwrap();
        let picked = pick_version(&versions, |v| *v, Some(&range)).unwrap();
        assert_eq!(*picked, "1.5.0");
    }

    #[test]
    fn only_unparseable_candidates_is_not_found() {
        let versions = ["build-47", "nightly"];
        let range = VersionReq::parse(">=0").unwrap();
        assert!(matches!(
            pick_version(&versions, |v| *v, Some(&range)),
            Err(UpdateError::NotFound(_))
        ));
    }

    #[derive(Debug)]
    struct Artifact {
        filename: &'static str,
        primary: bool,
    }

    fn artifact(filename: &'static str) -> Artifact {
        Artifact {
            filename,
            primary: false,
        }
    }

    fn select(files: &[Artifact]) -> &'static str {
        select_artifact(files, |f| f.filename, |f| f.primary).filename
    }

    #[test]
    fn paper_variant_beats_spigot() {
        let files = [artifact("foo-1.0-spigot.jar"), artifact("foo-1.0-paper.jar")];
        assert_eq!(select(&files), "foo-1.0-paper.jar");
    }

    #[test]
    fn spigot_beats_bukkit() {
        let files = [artifact("foo-1.0-bukkit.jar"), artifact("foo-1.0-spigot.jar")];
        assert_eq!(select(&files), "foo-1.0-spigot.jar");
    }

    #[test]
    fn primary_flag_breaks_unknown_variants() {
        let files = [
            artifact("foo-1.0-forge.jar"),
            Artifact {
                filename: "foo-1.0-fabric.jar",
                primary: true,
            },
        ];
        assert_eq!(select(&files), "foo-1.0-fabric.jar");
    }

    #[test]
    fn empty_variant_beats_first_listed() {
        // Common prefix "foo-1.0", common suffix ".jar": the variants are
        // "-forge" and "".
        let files = [artifact("foo-1.0-forge.jar"), artifact("foo-1.0.jar")];
        assert_eq!(select(&files), "foo-1.0.jar");
    }

    #[test]
    fn falls_back_to_first_listed() {
        let files = [artifact("foo-1.0-forge.jar"), artifact("foo-1.0-fabric.jar")];
        assert_eq!(select(&files), "foo-1.0-forge.jar");
    }

    #[test]
    fn single_file_needs_no_disambiguation() {
        let files = [artifact("foo-1.0.jar")];
        assert_eq!(select(&files), "foo-1.0.jar");
    }
}
