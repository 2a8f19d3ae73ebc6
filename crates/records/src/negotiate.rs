// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use crate::format::RecordsFormat;

/// Pick a format both sides can handle.
///
/// Both lists are ordered best-first. Walks them pairwise, continuing past
/// the end of the shorter list, at each rank trying the source's candidate
/// on the target and then the target's candidate on the source.
pub fn negotiate<T, S>(
    source_formats: &[RecordsFormat],
    target_formats: &[RecordsFormat],
    target_can_load: T,
    source_can_unload: S,
) -> Option<RecordsFormat>
where
    T: Fn(&RecordsFormat) -> bool,
    S: Fn(&RecordsFormat) -> bool,
{
    let ranks = source_formats.len().max(target_formats.len());
    for rank in 0..ranks {
        if let Some(candidate) = source_formats.get(rank) {
            if target_can_load(candidate) {
                return Some(candidate.clone());
            }
        }
        if let Some(candidate) = target_formats.get(rank) {
            if source_can_unload(candidate) {
                return Some(candidate.clone());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hints::{PartialHints, Variant};

    #[test]
    fn test_prefers_earlier_rank() {
        let source = vec![RecordsFormat::Avro, RecordsFormat::Parquet];
        let target = vec![RecordsFormat::Parquet, RecordsFormat::bluelabs()];
        let chosen = negotiate(
            &source,
            &target,
            |f| *f == RecordsFormat::Parquet,
            |f| *f != RecordsFormat::bluelabs(),
        );
        assert_eq!(chosen, Some(RecordsFormat::Parquet));
    }

    #[test]
    fn test_target_candidate_used_when_source_list_short() {
        let csv = RecordsFormat::delimited(Variant::Csv, PartialHints::new());
        let source = vec![RecordsFormat::Avro];
        let target = vec![RecordsFormat::Parquet, csv.clone()];
        let chosen = negotiate(&source, &target, |_| false, |f| *f == csv);
        assert_eq!(chosen, Some(csv));
    }

    #[test]
    fn test_no_common_format() {
        let source = vec![RecordsFormat::Avro];
        let target = vec![RecordsFormat::Parquet];
        assert_eq!(negotiate(&source, &target, |_| false, |_| false), None);
    }

    #[test]
    fn test_is_deterministic() {
        let source = vec![RecordsFormat::bluelabs(), RecordsFormat::Parquet];
        let target = vec![RecordsFormat::Parquet];
        let first = negotiate(&source, &target, |_| true, |_| true);
        let second = negotiate(&source, &target, |_| true, |_| true);
        assert_eq!(first, second);
        assert_eq!(first, Some(RecordsFormat::bluelabs()));
    }
}
