// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! NAL unit header parsing and the closed `nal_unit_type` space.

/// The 5-bit `nal_unit_type` field (ITU-T H.264 Table 7-1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NalUnitType {
    Unspecified0,
    SliceNonIdr,
    SliceDataPartitionA,
    SliceDataPartitionB,
    SliceDataPartitionC,
    SliceIdr,
    Sei,
    Sps,
    Pps,
    AccessUnitDelimiter,
    EndOfSequence,
    EndOfStream,
    FillerData,
    SpsExtension,
    PrefixNalUnit,
    SubsetSps,
    Reserved(u8),
    SliceAux,
    SliceExtension,
    Unspecified(u8),
}

impl NalUnitType {
    pub fn from_u8(value: u8) -> NalUnitType {
        use NalUnitType::*;
        match value {
            0 => Unspecified0,
            1 => SliceNonIdr,
            2 => SliceDataPartitionA,
            3 => SliceDataPartitionB,
            4 => SliceDataPartitionC,
            5 => SliceIdr,
            6 => Sei,
            7 => Sps,
            8 => Pps,
            9 => AccessUnitDelimiter,
            10 => EndOfSequence,
            11 => EndOfStream,
            12 => FillerData,
            13 => SpsExtension,
            14 => PrefixNalUnit,
            15 => SubsetSps,
            16..=18 => Reserved(value),
            19 => SliceAux,
            20 => SliceExtension,
            21..=23 => Reserved(value),
            24..=31 => Unspecified(value),
            _ => unreachable!("nal_unit_type is a 5-bit field"),
        }
    }

    /// `true` for NALU types 1-5 inclusive: VCL (coded slice) units
    /// (`spec.md` §4.3).
    pub fn is_vcl(self) -> bool {
        matches!(
            self,
            NalUnitType::SliceNonIdr
                | NalUnitType::SliceDataPartitionA
                | NalUnitType::SliceDataPartitionB
                | NalUnitType::SliceDataPartitionC
                | NalUnitType::SliceIdr
        )
    }

    /// `true` for an IDR coded slice (type 5).
    pub fn is_idr(self) -> bool {
        matches!(self, NalUnitType::SliceIdr)
    }
}

/// The one-byte NAL header: `forbidden_zero_bit`, `nal_ref_idc`,
/// `nal_unit_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NalHeader {
    pub nal_ref_idc: u8,
    pub nal_unit_type: NalUnitType,
}

impl NalHeader {
    /// Parses the leading byte of a NALU (after the start code, before any
    /// emulation-prevention stripping — the header byte itself is never
    /// `00 00 03`-escaped).
    pub fn parse(byte: u8) -> NalHeader {
        NalHeader {
            nal_ref_idc: (byte >> 5) & 0b11,
            nal_unit_type: NalUnitType::from_u8(byte & 0b0001_1111),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sps_header() {
        // forbidden=0, ref_idc=3, type=7 (SPS): 0_11_00111
        let header = NalHeader::parse(0b0_11_00111);
        assert_eq!(header.nal_ref_idc, 3);
        assert_eq!(header.nal_unit_type, NalUnitType::Sps);
    }

    #[test]
    fn idr_slice_is_vcl_and_idr() {
        let header = NalHeader::parse(0b0_11_00101);
        assert!(header.nal_unit_type.is_vcl());
        assert!(header.nal_unit_type.is_idr());
    }

    #[test]
    fn non_idr_slice_is_vcl_not_idr() {
        let header = NalHeader::parse(0b0_01_00001);
        assert!(header.nal_unit_type.is_vcl());
        assert!(!header.nal_unit_type.is_idr());
    }

    #[test]
    fn sei_is_not_vcl() {
        let header = NalHeader::parse(0b0_00_00110);
        assert!(!header.nal_unit_type.is_vcl());
    }
}
