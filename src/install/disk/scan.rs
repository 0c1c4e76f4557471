use super::types::DiskRegion;
use crate::install::error::{InstallError, InstallResult};

/// Pick the largest free region; the first one wins on ties.
pub fn select_largest(regions: &[DiskRegion], floor_mib: u64) -> InstallResult<DiskRegion> {
    let mut best: Option<DiskRegion> = None;
    for region in regions {
        if best.is_none_or(|b| region.size_mib() > b.size_mib()) {
            best = Some(*region);
        }
    }

    match best {
        Some(region) if region.size_mib() >= floor_mib => Ok(region),
        other => Err(InstallError::InsufficientSpace {
            largest_mib: other.map(|r| r.size_mib()).unwrap_or(0),
            required_mib: floor_mib,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region(start: u64, end: u64) -> DiskRegion {
        DiskRegion::new(start, end).unwrap()
    }

    #[test]
    fn test_selects_largest_of_three() {
        let regions = [region(0, 100), region(200, 1000), region(1050, 1080)];
        let selected = select_largest(&regions, 500).unwrap();
        assert_eq!(selected, region(200, 1000));
        assert_eq!(selected.size_mib(), 800);
    }

    #[test]
    fn test_tie_goes_to_first_seen() {
        let regions = [region(0, 100), region(500, 600), region(700, 800)];
        assert_eq!(select_largest(&regions, 0).unwrap(), region(0, 100));
    }

    #[test]
    fn test_all_below_floor_is_insufficient() {
        let regions = [region(0, 100), region(200, 300)];
        match select_largest(&regions, 500) {
            Err(InstallError::InsufficientSpace {
                largest_mib,
                required_mib,
            }) => {
                assert_eq!(largest_mib, 100);
                assert_eq!(required_mib, 500);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_no_regions_is_insufficient() {
        assert!(matches!(
            select_largest(&[], 1),
            Err(InstallError::InsufficientSpace { largest_mib: 0, .. })
        ));
    }

    #[test]
    fn test_result_is_maximal_for_any_floor() {
        let regions = [
            region(10, 40),
            region(50, 51),
            region(60, 160),
            region(170, 200),
            region(300, 400),
        ];
        let max = regions.iter().map(|r| r.size_mib()).max().unwrap();
        for floor in [0, 1, 30, 99, 100, 101, 1000] {
            match select_largest(&regions, floor) {
                Ok(selected) => {
                    assert_eq!(selected.size_mib(), max);
                    assert_eq!(selected, region(60, 160));
                    assert!(floor <= max);
                }
                Err(_) => assert!(floor > max),
            }
        }
    }
}
