use a2core::nibble::{
    defour_and_four, explode_sector13, explode_sector16, four_and_four, read_sector, write_sector,
    Encoding, BYTES_PER_SECTOR,
};
use proptest::prelude::*;

fn sector_data() -> impl Strategy<Value = [u8; BYTES_PER_SECTOR]> {
    prop::collection::vec(any::<u8>(), BYTES_PER_SECTOR).prop_map(|v| {
        let mut data = [0u8; BYTES_PER_SECTOR];
        data.copy_from_slice(&v);
        data
    })
}

proptest! {
    #[test]
    fn four_and_four_roundtrip(b in any::<u8>()) {
        let [xx, yy] = four_and_four(b);
        prop_assert_eq!(defour_and_four(xx, yy), b);
    }

    #[test]
    fn sector16_roundtrip(
        data in sector_data(),
        volume in any::<u8>(),
        track in 0u8..35,
        sector in 0u8..16,
    ) {
        let bytes = explode_sector16(volume, track, sector, &data);
        let decoded = read_sector(&bytes, track, sector).unwrap();
        prop_assert_eq!(decoded.data, data);
        prop_assert_eq!(decoded.volume, volume);
        prop_assert_eq!(decoded.encoding, Encoding::SixAndTwo);
    }

    #[test]
    fn sector13_roundtrip(
        data in sector_data(),
        volume in any::<u8>(),
        track in 0u8..35,
        sector in 0u8..13,
    ) {
        let bytes = explode_sector13(volume, track, sector, &data);
        let decoded = read_sector(&bytes, track, sector).unwrap();
        prop_assert_eq!(decoded.data, data);
        prop_assert_eq!(decoded.encoding, Encoding::FiveAndThree);
    }

    #[test]
    fn rewritten_sector_reads_back(
        old in sector_data(),
        new in sector_data(),
        sector in 0u8..16,
    ) {
        let mut track = Vec::new();
        for s in 0..16u8 {
            track.extend(explode_sector16(254, 7, s, &old));
        }
        let len = track.len();
        prop_assert!(write_sector(&mut track, 7, sector, &new));
        prop_assert_eq!(track.len(), len);
        prop_assert_eq!(read_sector(&track, 7, sector).unwrap().data, new);
        let other = (sector + 1) % 16;
        prop_assert_eq!(read_sector(&track, 7, other).unwrap().data, old);
    }
}
