use std::io::Cursor;

use crate::mmap::{OwnedMmap, page_size, parse_hugepage_info};

const MEMINFO: &str = "\
MemTotal:       32598784 kB
MemFree:         1620512 kB
HugePages_Total:      16
HugePages_Free:       12
HugePages_Rsvd:        0
Hugepagesize:       2048 kB
Hugetlb:           32768 kB
";

#[test]
fn test_parse_hugepage_info() {
    let info = parse_hugepage_info(Cursor::new(MEMINFO)).unwrap();
    assert_eq!(info.size_kb, Some(2048));
    assert_eq!(info.total, Some(16));
    assert_eq!(info.free, Some(12));
}

#[test]
fn test_parse_hugepage_info_missing_keys() {
    let info = parse_hugepage_info(Cursor::new("MemTotal: 1024 kB\n")).unwrap();
    assert!(info.size_kb.is_none());
    assert!(info.free.is_none());
}

#[test]
fn test_parse_hugepage_info_garbage() {
    assert!(parse_hugepage_info(Cursor::new("HugePages_Free: lots\n")).is_err());
}

#[test]
fn test_anonymous_mapping_is_page_rounded_and_zeroed() {
    let mmap = OwnedMmap::anonymous(100, Some(false)).unwrap();
    assert_eq!(mmap.len() % page_size(), 0);
    assert!(mmap.len() >= 100);
    let bytes = unsafe { std::slice::from_raw_parts(mmap.as_u8_ptr(), mmap.len()) };
    assert!(bytes.iter().all(|&b| b == 0));
}
