use std::collections::HashMap;
use std::collections::hash_map::Entry;

use chrono::NaiveDate;

use super::record::ReleaseRecord;

/// `(title, release_date)` が一致するレコードを一つにまとめる。
///
/// 比較は大文字小文字を区別する完全一致。重複がある場合は入力順で後のレコードが
/// 採用され、出力上の位置は最初に現れた位置のまま保たれる。
#[must_use]
pub fn dedupe(records: Vec<ReleaseRecord>) -> Vec<ReleaseRecord> {
    let mut positions: HashMap<(String, NaiveDate), usize> = HashMap::with_capacity(records.len());
    let mut unique: Vec<ReleaseRecord> = Vec::with_capacity(records.len());

    for record in records {
        match positions.entry((record.title.clone(), record.release_date)) {
            Entry::Occupied(slot) => unique[*slot.get()] = record,
            Entry::Vacant(slot) => {
                slot.insert(unique.len());
                unique.push(record);
            }
        }
    }

    unique
}
