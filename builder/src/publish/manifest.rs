//! Path manifest and entry-point rewriting

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Content type gateways use to recognise a path manifest
pub const MANIFEST_CONTENT_TYPE: &str = "application/x.arweave-manifest+json";

const MANIFEST_KIND: &str = "arweave/paths";
const MANIFEST_VERSION: &str = "0.1.0";

/// Pointer to the entry point served for the bare manifest id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestIndex {
    pub path: String,
}

/// Content id of one published file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub id: String,
}

/// Maps relative paths to content ids; gateways resolve
/// `<manifest id>/<path>` through it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathManifest {
    pub manifest: String,
    pub version: String,
    pub index: ManifestIndex,
    pub paths: BTreeMap<String, ManifestEntry>,
}

impl PathManifest {
    pub fn new(index: &str, paths: BTreeMap<String, String>) -> Self {
        Self {
            manifest: MANIFEST_KIND.to_string(),
            version: MANIFEST_VERSION.to_string(),
            index: ManifestIndex {
                path: index.to_string(),
            },
            paths: paths
                .into_iter()
                .map(|(path, id)| (path, ManifestEntry { id }))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

const ROOT_ATTRIBUTES: [&[u8]; 2] = [b" src=\"", b" href=\""];

/// Turn root-absolute `src`/`href` attributes into relative ones.
///
/// A site published under `<gateway>/<id>/` cannot use `/app.js`; it becomes
/// `./app.js`. Protocol-relative `//host/...` URLs are left alone. Works on
/// raw bytes, so pages in any ASCII-compatible encoding are rewritten.
pub fn rewrite_root_paths(html: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(html.len() + 16);
    let mut rest = html;

    loop {
        let next = ROOT_ATTRIBUTES
            .iter()
            .filter_map(|attr| find(rest, attr).map(|at| at + attr.len()))
            .min();

        let Some(end) = next else {
            out.extend_from_slice(rest);
            return out;
        };

        out.extend_from_slice(&rest[..end]);
        rest = &rest[end..];
        if rest.starts_with(b"/") && !rest.starts_with(b"//") {
            out.extend_from_slice(b"./");
            rest = &rest[1..];
        }
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
