//! Work item selection
//!
//! Turns loose code arguments into a sorted, de-duplicated list of
//! [`WorkItem`]s. A single letter expands to the 26 two-letter codes starting
//! with it; two letters are taken literally.

use std::collections::BTreeSet;
use std::path::Path;

use crate::config::SelectionConfig;
use crate::error::{Error, Result};
use crate::types::WorkItem;

/// The 20 most populous countries, used when nothing else is selected
pub const POP20_CC: [&str; 20] = [
    "CN", "IN", "US", "ID", "BR", "PK", "NG", "BD", "RU", "JP", "MX", "PH", "VN", "ET", "EG", "DE",
    "IR", "TR", "CD", "FR",
];

const A_Z: std::ops::RangeInclusive<u8> = b'A'..=b'Z';

/// [`POP20_CC`] as sorted work items
pub fn pop20() -> Vec<WorkItem> {
    let codes: BTreeSet<&str> = POP20_CC.into_iter().collect();
    codes.into_iter().map(WorkItem::from).collect()
}

/// Every code from AA to ZZ
pub fn every_code() -> Vec<String> {
    A_Z.flat_map(|a| A_Z.map(move |b| format!("{}{}", a as char, b as char)))
        .collect()
}

/// Expand code arguments ("b" → BA..BZ, "br" → BR)
pub fn expand_args<S: AsRef<str>>(args: &[S]) -> Result<BTreeSet<String>> {
    let mut codes = BTreeSet::new();
    for arg in args {
        let cc = arg.as_ref().trim().to_ascii_uppercase();
        if !cc.bytes().all(|b| A_Z.contains(&b)) {
            return Err(invalid(arg.as_ref()));
        }
        match cc.len() {
            1 => codes.extend(A_Z.map(|b| format!("{cc}{}", b as char))),
            2 => {
                codes.insert(cc);
            }
            _ => return Err(invalid(arg.as_ref())),
        }
    }
    Ok(codes)
}

/// Read whitespace-separated codes from a file
pub fn read_code_file(path: &Path) -> Result<BTreeSet<String>> {
    let text = std::fs::read_to_string(path).map_err(|source| Error::ReadFile {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(text
        .split_whitespace()
        .map(|code| code.to_ascii_uppercase())
        .collect())
}

/// Resolve a selection into the items of a run
///
/// Precedence: `every`, then `all_from`, then `codes`, then [`POP20_CC`].
pub fn select(selection: &SelectionConfig) -> Result<Vec<WorkItem>> {
    let codes: BTreeSet<String> = if selection.every {
        every_code().into_iter().collect()
    } else if let Some(path) = &selection.all_from {
        read_code_file(path)?
    } else if !selection.codes.is_empty() {
        expand_args(&selection.codes)?
    } else {
        POP20_CC.iter().map(|cc| cc.to_string()).collect()
    };

    let limit = selection.limit.unwrap_or(usize::MAX);
    Ok(codes.into_iter().take(limit).map(WorkItem::new).collect())
}

fn invalid(input: &str) -> Error {
    Error::InvalidItem {
        input: input.to_string(),
        reason: "each code argument must be A to Z or AA to ZZ".to_string(),
    }
}
