//! Generators for municipality id lists.

/// `n` distinct seven-digit ids starting at a fixed São Paulo state code.
///
/// # Example
///
/// ```
/// use test_utils::city_ids;
///
/// let ids = city_ids(3);
/// assert_eq!(ids, vec!["3500000", "3500001", "3500002"]);
/// ```
pub fn city_ids(n: usize) -> Vec<String> {
    city_ids_from(3_500_000, n)
}

/// `n` consecutive ids starting at `start`.
pub fn city_ids_from(start: u32, n: usize) -> Vec<String> {
    (0..n as u32).map(|i| (start + i).to_string()).collect()
}

/// Ids with every `every`-th one repeated, for dedup tests.
pub fn city_ids_with_duplicates(n: usize, every: usize) -> Vec<String> {
    let base = city_ids(n);
    let mut out = Vec::with_capacity(n + n / every.max(1));
    for (i, id) in base.into_iter().enumerate() {
        if every > 0 && i % every == 0 {
            out.push(id.clone());
        }
        out.push(id);
    }
    out
}
