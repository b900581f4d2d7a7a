use std::collections::BTreeSet;

/// Parse a kernel CPU-list string like `"1-3,5,7-8"` into the set of CPU ids
/// it covers.
///
/// The same grammar appears in sysfs masks (`/sys/devices/system/cpu/isolated`)
/// and kernel command-line values (`nohz_full=`, `irqaffinity=`). Whitespace
/// around tokens is ignored, reversed ranges are normalized, and malformed
/// tokens are dropped without error.
pub fn parse_cpu_list(raw: &str) -> BTreeSet<u32> {
    let mut cpus = BTreeSet::new();

    for token in raw.trim().split(',') {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }

        match token.split_once('-') {
            None => {
                if let Ok(cpu) = token.parse::<u32>() {
                    cpus.insert(cpu);
                }
            }
            Some((start, end)) => {
                let start = start.trim().parse::<u32>();
                let end = end.trim().parse::<u32>();
                if let (Ok(a), Ok(b)) = (start, end) {
                    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
                    cpus.extend(lo..=hi);
                }
            }
        }
    }

    cpus
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(cpus: &[u32]) -> BTreeSet<u32> {
        cpus.iter().copied().collect()
    }

    #[test]
    fn test_mixed_ranges_and_singles() {
        assert_eq!(parse_cpu_list("1-3,5,7-8"), set(&[1, 2, 3, 5, 7, 8]));
    }

    #[test]
    fn test_reversed_range_is_swapped() {
        assert_eq!(parse_cpu_list("5-3"), set(&[3, 4, 5]));
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(parse_cpu_list(""), BTreeSet::new());
        assert_eq!(parse_cpu_list("   \n"), BTreeSet::new());
    }

    #[test]
    fn test_malformed_tokens_are_skipped() {
        assert_eq!(parse_cpu_list("2,abc,4"), set(&[2, 4]));
        assert_eq!(parse_cpu_list("1,2-x,3"), set(&[1, 3]));
        assert_eq!(parse_cpu_list(",,"), BTreeSet::new());
    }

    #[test]
    fn test_whitespace_around_tokens() {
        assert_eq!(parse_cpu_list(" 1 , 2 "), set(&[1, 2]));
        assert_eq!(parse_cpu_list("0 - 2"), set(&[0, 1, 2]));
    }

    #[test]
    fn test_single_cpu() {
        assert_eq!(parse_cpu_list("7"), set(&[7]));
        assert_eq!(parse_cpu_list("7\n"), set(&[7]));
    }

    #[test]
    fn test_extra_dashes_are_skipped() {
        // "1-2-3" splits as "1" / "2-3"; the tail fails to parse as an int.
        assert_eq!(parse_cpu_list("1-2-3"), BTreeSet::new());
    }

    #[test]
    fn test_duplicates_collapse() {
        assert_eq!(parse_cpu_list("1,1,1-2"), set(&[1, 2]));
    }
}
