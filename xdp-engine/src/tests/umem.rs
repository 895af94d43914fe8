use crate::error::{Violation, XdpError};
use crate::umem::Umem;

fn umem(frames: u32) -> Umem {
    Umem::create(2048, frames, Some(false)).unwrap()
}

#[test]
fn test_geometry() {
    let umem = umem(16);
    assert_eq!(umem.frame_size(), 2048);
    assert_eq!(umem.frame_count(), 16);
    assert_eq!(umem.len(), 16 * 2048);
    assert!(!umem.is_empty());
}

#[test]
fn test_create_rejects_bad_geometry() {
    assert!(matches!(
        Umem::create(3000, 4, Some(false)),
        Err(XdpError::Config(_))
    ));
    assert!(matches!(
        Umem::create(2048, 0, Some(false)),
        Err(XdpError::Config(_))
    ));
}

#[test]
fn test_frame_address_and_index() {
    let umem = umem(4);
    assert_eq!(umem.frame_address(3).unwrap(), 3 * 2048);
    assert_eq!(umem.frame_address(4), Err(Violation::InvalidFrameIndex(4)));
    assert_eq!(umem.frame_index(2048 + 17), Some(1));
    assert_eq!(umem.frame_index(4 * 2048), None);
    assert_eq!(umem.frame_base(3 * 2048 + 100), 3 * 2048);
}

#[test]
fn test_data_stays_inside_a_frame() {
    let mut umem = umem(4);
    umem.data_at_mut(2048, 4).unwrap().copy_from_slice(b"abcd");
    assert_eq!(umem.data_at(2048, 4).unwrap(), b"abcd");
    assert_eq!(umem.data_at(2048 + 2, 2).unwrap(), b"cd");
    assert_eq!(umem.data_at(0, 2048).unwrap().len(), 2048);

    assert_eq!(
        umem.data_at(2048 + 2047, 2),
        Err(Violation::InvalidAddress {
            addr: 2048 + 2047,
            len: 2
        })
    );
    assert!(umem.data_at(4 * 2048, 1).is_err());
}

#[test]
fn test_frame_mut_covers_whole_frame() {
    let mut umem = umem(2);
    let frame = umem.frame_mut(2048 + 10).unwrap();
    assert_eq!(frame.len(), 2048);
    frame[0] = 0xaa;
    assert_eq!(umem.data_at(2048, 1).unwrap(), &[0xaa]);
}

#[test]
fn test_shared_handle_sees_same_memory() {
    let mut umem = umem(2);
    let other = umem.share();
    umem.data_at_mut(0, 3).unwrap().copy_from_slice(&[1, 2, 3]);
    assert_eq!(other.data_at(0, 3).unwrap(), &[1, 2, 3]);
}
