/// General table lookup: either interpolated or nearest neighbour.
/// `table` must be interleaved `[key0, val0, key1, val1, ...]` with keys in
/// ascending order. Values outside the key range clamp to the edge entries.
pub(super) fn lookup_table(table: &[f64], raw: f64, interp: bool) -> Option<f64> {
    let len = table.len();
    if len < 4 || len % 2 != 0 {
        return None;
    }
    let n = len / 2;
    let key = |i: usize| table[2 * i];
    let val = |i: usize| table[2 * i + 1];

    if raw <= key(0) {
        return Some(val(0));
    }
    if raw >= key(n - 1) {
        return Some(val(n - 1));
    }
    for i in 0..(n - 1) {
        let (k0, k1) = (key(i), key(i + 1));
        if raw >= k0 && raw <= k1 {
            if interp {
                let t = (raw - k0) / (k1 - k0);
                return Some(val(i) + t * (val(i + 1) - val(i)));
            }
            let nearest = if k1 - raw < raw - k0 { i + 1 } else { i };
            return Some(val(nearest));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: [f64; 8] = [0.0, 10.0, 1.0, 20.0, 2.0, 40.0, 3.0, 80.0];

    #[test]
    fn interpolates_between_keys() {
        assert_eq!(lookup_table(&TABLE, 0.5, true), Some(15.0));
        assert_eq!(lookup_table(&TABLE, 2.5, true), Some(60.0));
    }

    #[test]
    fn nearest_neighbour_picks_closest() {
        assert_eq!(lookup_table(&TABLE, 0.4, false), Some(10.0));
        assert_eq!(lookup_table(&TABLE, 0.6, false), Some(20.0));
    }

    #[test]
    fn clamps_outside_range() {
        assert_eq!(lookup_table(&TABLE, -5.0, true), Some(10.0));
        assert_eq!(lookup_table(&TABLE, 99.0, true), Some(80.0));
    }

    #[test]
    fn rejects_malformed_tables() {
        assert_eq!(lookup_table(&[1.0, 2.0], 1.0, true), None);
        assert_eq!(lookup_table(&[1.0, 2.0, 3.0], 1.0, true), None);
    }
}
