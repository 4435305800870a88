//! Advertising data parsing.
//!
//! Advertising payloads are a flat sequence of AD structures:
//!
//! ```text
//! +-----+------+-----------------+-----+------+-----
//! |  L  | type | value (L-1)     |  L  | type | ...
//! +-----+------+-----------------+-----+------+-----
//! ```
//!
//! `L` counts the type byte plus the value. The payload comes straight from
//! a peer, so every length is checked against the buffer before use.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use tracing::trace;

use crate::ble::uuids::BleUuid;
use crate::error::{Error, Result};

/// Assigned AD type numbers.
///
/// Values from the Bluetooth SIG "Assigned Numbers" document, section 2.3.
pub mod ad_types {
    /// Flags.
    pub const FLAGS: u8 = 0x01;
    /// Incomplete list of 16-bit service UUIDs.
    pub const UUID16_MORE_AVAILABLE: u8 = 0x02;
    /// Complete list of 16-bit service UUIDs.
    pub const UUID16_COMPLETE: u8 = 0x03;
    /// Incomplete list of 32-bit service UUIDs.
    pub const UUID32_MORE_AVAILABLE: u8 = 0x04;
    /// Complete list of 32-bit service UUIDs.
    pub const UUID32_COMPLETE: u8 = 0x05;
    /// Incomplete list of 128-bit service UUIDs.
    pub const UUID128_MORE_AVAILABLE: u8 = 0x06;
    /// Complete list of 128-bit service UUIDs.
    pub const UUID128_COMPLETE: u8 = 0x07;
    /// Shortened local name.
    pub const SHORT_LOCAL_NAME: u8 = 0x08;
    /// Complete local name.
    pub const COMPLETE_LOCAL_NAME: u8 = 0x09;
    /// TX power level.
    pub const TX_POWER_LEVEL: u8 = 0x0A;
    /// Service data, 16-bit UUID.
    pub const SERVICE_DATA_UUID16: u8 = 0x16;
    /// Appearance.
    pub const APPEARANCE: u8 = 0x19;
    /// Service data, 128-bit UUID.
    pub const SERVICE_DATA_UUID128: u8 = 0x21;
    /// Manufacturer specific data.
    pub const MANUFACTURER_SPECIFIC_DATA: u8 = 0xFF;
}

/// Peer address type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum AddressType {
    /// Public device address.
    #[default]
    Public = 0,
    /// Random static address.
    RandomStatic = 1,
    /// Random private resolvable address.
    RandomPrivateResolvable = 2,
    /// Random private non-resolvable address.
    RandomPrivateNonResolvable = 3,
}

impl AddressType {
    /// Create from raw byte value.
    pub fn from_raw(value: u8) -> Self {
        match value {
            1 => Self::RandomStatic,
            2 => Self::RandomPrivateResolvable,
            3 => Self::RandomPrivateNonResolvable,
            _ => Self::Public,
        }
    }
}

/// Bluetooth device address of an advertiser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PeerAddress {
    /// Address type.
    pub kind: AddressType,
    /// Address bytes, least significant first (on-air order).
    pub bytes: [u8; 6],
}

impl PeerAddress {
    /// Create a new peer address.
    pub fn new(kind: AddressType, bytes: [u8; 6]) -> Self {
        Self { kind, bytes }
    }
}

impl std::fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let b = &self.bytes;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            b[5], b[4], b[3], b[2], b[1], b[0]
        )
    }
}

/// One AD structure, borrowed from the payload it was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdStructure<'a> {
    /// Offset of the value within the payload.
    pub offset: usize,
    /// AD type byte.
    pub ad_type: u8,
    /// Value bytes (`L - 1` of them).
    pub value: &'a [u8],
}

/// Iterator over the AD structures of an advertising payload.
///
/// Yields `Err(Error::MalformedAdvertisingData)` once if a length field is
/// zero or runs past the end of the buffer, then stops.
#[derive(Debug, Clone)]
pub struct AdStructures<'a> {
    data: &'a [u8],
    offset: usize,
    done: bool,
}

impl<'a> AdStructures<'a> {
    /// Iterate the AD structures in `data`.
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            offset: 0,
            done: false,
        }
    }

    fn malformed(&mut self, context: String) -> Option<Result<AdStructure<'a>>> {
        self.done = true;
        trace!("Malformed advertising data: {}", context);
        Some(Err(Error::MalformedAdvertisingData { context }))
    }
}

impl<'a> Iterator for AdStructures<'a> {
    type Item = Result<AdStructure<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let remaining = self.data.len() - self.offset;
        if remaining == 0 {
            self.done = true;
            return None;
        }

        let len = self.data[self.offset] as usize;
        if len == 0 {
            let context = format!("zero-length record at offset {}", self.offset);
            return self.malformed(context);
        }
        if len + 1 > remaining {
            let context = format!(
                "record at offset {} claims {} bytes, only {} remain",
                self.offset,
                len,
                remaining - 1
            );
            return self.malformed(context);
        }

        let ad_type = self.data[self.offset + 1];
        let start = self.offset + 2;
        let end = self.offset + 1 + len;
        let record = AdStructure {
            offset: start,
            ad_type,
            value: &self.data[start..end],
        };

        self.offset = end;
        Some(Ok(record))
    }
}

impl std::iter::FusedIterator for AdStructures<'_> {}

/// Find the first record of `ad_type`, surfacing malformed data as an error.
///
/// Returns `(value_offset, value_len)` into `data`. A malformed record
/// ahead of the match ends the walk with an error.
pub fn try_find_record_by_type(data: &[u8], ad_type: u8) -> Result<Option<(usize, usize)>> {
    for record in AdStructures::new(data) {
        let record = record?;
        if record.ad_type == ad_type {
            return Ok(Some((record.offset, record.value.len())));
        }
    }
    Ok(None)
}

/// Find the first record of `ad_type` in an advertising payload.
///
/// Returns `(value_offset, value_len)` into `data`, or `None` if the type is
/// absent or the payload is malformed before a match is reached.
///
/// # Example
///
/// ```
/// use ble_scan_manager::ble::advertising::find_record_by_type;
///
/// let data = [3, 0x05, 0xAA, 0xBB, 2, 0x09, 0x41];
/// assert_eq!(find_record_by_type(&data, 0x09), Some((6, 1)));
/// assert_eq!(find_record_by_type(&data, 0x7F), None);
/// ```
pub fn find_record_by_type(data: &[u8], ad_type: u8) -> Option<(usize, usize)> {
    try_find_record_by_type(data, ad_type).ok().flatten()
}

/// Value slice of the first record of `ad_type`, if any.
pub fn record_value(data: &[u8], ad_type: u8) -> Option<&[u8]> {
    find_record_by_type(data, ad_type).map(|(offset, len)| &data[offset..offset + len])
}

/// A received advertising report.
///
/// Borrows the driver's buffer, so it cannot outlive the event it came with.
/// Use [`AdvertisingReport::snapshot`] to keep the contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdvertisingReport<'a> {
    /// Advertiser address.
    pub address: PeerAddress,
    /// Signal strength in dBm.
    pub rssi: i8,
    data: &'a [u8],
}

impl<'a> AdvertisingReport<'a> {
    /// Create a report over the whole of `data`.
    pub fn new(address: PeerAddress, rssi: i8, data: &'a [u8]) -> Self {
        Self {
            address,
            rssi,
            data,
        }
    }

    /// Create a report whose payload length is declared separately.
    ///
    /// The payload is clamped to `min(declared_len, data.len())`.
    pub fn with_declared_len(
        address: PeerAddress,
        rssi: i8,
        data: &'a [u8],
        declared_len: usize,
    ) -> Self {
        let len = declared_len.min(data.len());
        Self::new(address, rssi, &data[..len])
    }

    /// Raw advertising payload.
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Iterate the AD structures of this report.
    pub fn structures(&self) -> AdStructures<'a> {
        AdStructures::new(self.data)
    }

    /// Value of the first record of `ad_type`.
    pub fn record(&self, ad_type: u8) -> Option<&'a [u8]> {
        record_value(self.data, ad_type)
    }

    /// Check if the report advertises `uuid` as a service.
    pub fn contains_uuid(&self, uuid: &BleUuid) -> bool {
        crate::ble::uuids::report_contains_uuid(self, uuid)
    }

    /// Advertising flags byte.
    pub fn flags(&self) -> Option<u8> {
        self.record(ad_types::FLAGS).and_then(|v| v.first().copied())
    }

    /// Device name, preferring the complete name over the shortened one.
    ///
    /// Returns `None` if neither is present or the name is not UTF-8.
    pub fn local_name(&self) -> Option<&'a str> {
        self.record(ad_types::COMPLETE_LOCAL_NAME)
            .or_else(|| self.record(ad_types::SHORT_LOCAL_NAME))
            .and_then(|v| std::str::from_utf8(v).ok())
    }

    /// Advertised TX power in dBm.
    pub fn tx_power(&self) -> Option<i8> {
        self.record(ad_types::TX_POWER_LEVEL).and_then(|v| v.first().map(|&b| b as i8))
    }

    /// Company identifier and payload of the manufacturer specific data.
    pub fn manufacturer_data(&self) -> Option<(u16, &'a [u8])> {
        let value = self.record(ad_types::MANUFACTURER_SPECIFIC_DATA)?;
        if value.len() < 2 {
            return None;
        }
        let company = u16::from_le_bytes([value[0], value[1]]);
        Some((company, &value[2..]))
    }

    /// Copy the report so it can be kept after the event returns.
    pub fn snapshot(&self) -> OwnedAdvertisingReport {
        OwnedAdvertisingReport {
            address: self.address,
            rssi: self.rssi,
            data: Bytes::copy_from_slice(self.data),
            received_at: Utc::now(),
        }
    }
}

/// Owned copy of an [`AdvertisingReport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnedAdvertisingReport {
    /// Advertiser address.
    pub address: PeerAddress,
    /// Signal strength in dBm.
    pub rssi: i8,
    /// Copied advertising payload.
    pub data: Bytes,
    /// When the copy was taken.
    pub received_at: DateTime<Utc>,
}

impl OwnedAdvertisingReport {
    /// Borrow this copy as a report.
    pub fn as_report(&self) -> AdvertisingReport<'_> {
        AdvertisingReport::new(self.address, self.rssi, &self.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    const SAMPLE: [u8; 7] = [3, 0x05, 0xAA, 0xBB, 2, 0x09, 0x41];

    fn report(data: &[u8]) -> AdvertisingReport<'_> {
        AdvertisingReport::new(PeerAddress::default(), -60, data)
    }

    #[test]
    fn test_find_record_by_type() {
        assert_eq!(find_record_by_type(&SAMPLE, 0x09), Some((6, 1)));
        assert_eq!(find_record_by_type(&SAMPLE, 0x05), Some((2, 2)));
        assert_eq!(find_record_by_type(&SAMPLE, 0x7F), None);

        assert_eq!(record_value(&SAMPLE, 0x09), Some(&[0x41][..]));
        assert_eq!(record_value(&SAMPLE, 0x05), Some(&[0xAA, 0xBB][..]));
    }

    #[test]
    fn test_find_returns_leftmost() {
        let data = [2, 0x09, 0x01, 2, 0x09, 0x02];
        assert_eq!(record_value(&data, 0x09), Some(&[0x01][..]));
    }

    #[test]
    fn test_empty_value_record() {
        let data = [1, 0x08, 2, 0x09, 0x41];
        assert_eq!(find_record_by_type(&data, 0x08), Some((2, 0)));
        assert_eq!(record_value(&data, 0x09), Some(&[0x41][..]));
    }

    #[test]
    fn test_empty_buffer() {
        assert_eq!(find_record_by_type(&[], 0x01), None);
        assert_eq!(try_find_record_by_type(&[], 0x01), Ok(None));
    }

    #[test]
    fn test_zero_length_record_terminates() {
        let data = [0, 0x09, 0x41, 0x42];
        assert_eq!(find_record_by_type(&data, 0x09), None);
        assert!(matches!(
            try_find_record_by_type(&data, 0x09),
            Err(Error::MalformedAdvertisingData { .. })
        ));

        // A valid record before the zero length is still found.
        let data = [2, 0x01, 0x06, 0, 2, 0x09, 0x41];
        assert_eq!(find_record_by_type(&data, 0x01), Some((2, 1)));
        assert_eq!(find_record_by_type(&data, 0x09), None);
    }

    #[test]
    fn test_overrunning_record() {
        // Second record claims 9 bytes, only 2 remain.
        let data = [2, 0x01, 0x06, 9, 0x09, 0x41];
        assert_eq!(find_record_by_type(&data, 0x09), None);
        assert_eq!(find_record_by_type(&data, 0x01), Some((2, 1)));

        // Trailing length byte with no type byte.
        let data = [2, 0x01, 0x06, 1];
        assert_eq!(find_record_by_type(&data, 0x02), None);
    }

    #[test]
    fn test_structures_iterator() {
        let records: Vec<_> = AdStructures::new(&SAMPLE)
            .collect::<Result<Vec<_>>>()
            .unwrap();
        assert_eq!(
            records,
            vec![
                AdStructure {
                    offset: 2,
                    ad_type: 0x05,
                    value: &[0xAA, 0xBB],
                },
                AdStructure {
                    offset: 6,
                    ad_type: 0x09,
                    value: &[0x41],
                },
            ]
        );
    }

    #[test]
    fn test_structures_iterator_fuses_after_error() {
        let mut iter = AdStructures::new(&[2, 0x01, 0x06, 0, 1, 0x02]);
        assert!(iter.next().unwrap().is_ok());
        assert!(iter.next().unwrap().is_err());
        assert!(iter.next().is_none());
        assert!(iter.next().is_none());
    }

    #[test]
    fn test_declared_len_clamps() {
        let r = AdvertisingReport::with_declared_len(PeerAddress::default(), 0, &SAMPLE, 4);
        assert_eq!(r.len(), 4);
        assert_eq!(r.record(0x05), Some(&[0xAA, 0xBB][..]));
        assert_eq!(r.record(0x09), None);

        let r = AdvertisingReport::with_declared_len(PeerAddress::default(), 0, &SAMPLE, 200);
        assert_eq!(r.len(), SAMPLE.len());
    }

    #[test]
    fn test_report_accessors() {
        let data = [
            2, 0x01, 0x06, // flags
            2, 0x0A, 0xF8, // tx power -8
            5, 0x08, b'N', b'o', b'd', b'e', // short name
            5, 0xFF, 0x22, 0x08, 0x01, 0x02, // manufacturer 0x0822
        ];
        let r = report(&data);
        assert_eq!(r.flags(), Some(0x06));
        assert_eq!(r.tx_power(), Some(-8));
        assert_eq!(r.local_name(), Some("Node"));
        assert_eq!(r.manufacturer_data(), Some((0x0822, &[0x01, 0x02][..])));
    }

    #[test]
    fn test_complete_name_preferred() {
        let data = [3, 0x08, b'A', b'B', 4, 0x09, b'A', b'B', b'C'];
        assert_eq!(report(&data).local_name(), Some("ABC"));

        let invalid = [3, 0x09, 0xFF, 0xFE];
        assert_eq!(report(&invalid).local_name(), None);
    }

    #[test]
    fn test_peer_address_display() {
        let addr = PeerAddress::new(
            AddressType::RandomStatic,
            [0x66, 0x55, 0x44, 0x33, 0x22, 0xC1],
        );
        assert_eq!(addr.to_string(), "C1:22:33:44:55:66");
        assert_eq!(AddressType::from_raw(1), AddressType::RandomStatic);
        assert_eq!(AddressType::from_raw(9), AddressType::Public);
    }

    #[test]
    fn test_snapshot() {
        let r = report(&SAMPLE);
        let owned = r.snapshot();
        assert_eq!(&owned.data[..], &SAMPLE[..]);
        assert_eq!(owned.as_report(), r);
    }

    fn record_strategy() -> impl Strategy<Value = (u8, Vec<u8>)> {
        (any::<u8>(), proptest::collection::vec(any::<u8>(), 0..30))
    }

    fn encode(records: &[(u8, Vec<u8>)]) -> Vec<u8> {
        let mut out = Vec::new();
        for (ad_type, value) in records {
            out.push(value.len() as u8 + 1);
            out.push(*ad_type);
            out.extend_from_slice(value);
        }
        out
    }

    proptest! {
        #[test]
        fn prop_never_panics(
            data in proptest::collection::vec(any::<u8>(), 0..64),
            ad_type in any::<u8>(),
        ) {
            if let Some((offset, len)) = find_record_by_type(&data, ad_type) {
                prop_assert!(offset + len <= data.len());
            }
            prop_assert!(AdStructures::new(&data).count() <= data.len());
        }

        #[test]
        fn prop_matches_manual_walk(
            records in proptest::collection::vec(record_strategy(), 0..8),
            ad_type in any::<u8>(),
        ) {
            let data = encode(&records);

            let mut expected = None;
            let mut offset = 0;
            for (t, value) in &records {
                if *t == ad_type {
                    expected = Some((offset + 2, value.len()));
                    break;
                }
                offset += value.len() + 2;
            }

            prop_assert_eq!(find_record_by_type(&data, ad_type), expected);
        }
    }
}
