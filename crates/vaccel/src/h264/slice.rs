// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! Slice header parsing and the "new picture" boundary predicate.

use std::collections::BTreeMap;

use super::bitreader::BitReader;
use super::nal::NalHeader;
use super::pps::Pps;
use super::sps::Sps;
use super::Error;

/// The subset of `slice_header()` fields the new-picture predicate
/// compares (`spec.md` §4.3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SliceHeader {
    pub frame_num: u32,
    pub pic_parameter_set_id: u32,
    pub field_pic_flag: bool,
    pub bottom_field_flag: bool,
    pub nal_ref_idc: u8,
    pub is_idr: bool,
    pub idr_pic_id: Option<u32>,
    pub pic_order_cnt_lsb: Option<u32>,
    pub delta_pic_order_cnt_bottom: Option<i32>,
    pub delta_pic_order_cnt: [Option<i32>; 2],
}

impl SliceHeader {
    /// Parses the leading fields of a slice header's RBSP. The PPS/SPS a
    /// slice references are only known after `pic_parameter_set_id` itself
    /// has been read, so the caller passes the full parameter-set tables
    /// rather than a single looked-up `Pps`/`Sps`. Parsing stops once
    /// every field the new-picture predicate needs has been read; the
    /// remainder of `slice_header()` (ref-pic-list modification, weighted
    /// prediction, ...) is irrelevant to access-unit reassembly.
    pub fn parse(
        nal: NalHeader,
        rbsp: &[u8],
        pps_table: &BTreeMap<u32, Pps>,
        sps_table: &BTreeMap<u32, Sps>,
    ) -> Result<SliceHeader, Error> {
        let mut r = BitReader::new(rbsp);

        let _first_mb_in_slice = r.read_ue()?;
        let _slice_type = r.read_ue()?;
        let pic_parameter_set_id = r.read_ue()?;
        let pps = pps_table.get(&pic_parameter_set_id).ok_or_else(|| {
            Error::Error(format!(
                "slice references unknown pic_parameter_set_id {pic_parameter_set_id}"
            ))
        })?;
        let sps = sps_table.get(&pps.seq_parameter_set_id).ok_or_else(|| {
            Error::Error(format!(
                "PPS references unknown seq_parameter_set_id {}",
                pps.seq_parameter_set_id
            ))
        })?;

        let frame_num_bits = sps.log2_max_frame_num_minus4 + 4;
        let frame_num = r.read_bits(frame_num_bits)?;

        let mut field_pic_flag = false;
        let mut bottom_field_flag = false;
        if !sps.frame_mbs_only_flag {
            field_pic_flag = r.read_flag()?;
            if field_pic_flag {
                bottom_field_flag = r.read_flag()?;
            }
        }

        let is_idr = nal.nal_unit_type.is_idr();
        let mut idr_pic_id = None;
        if is_idr {
            idr_pic_id = Some(r.read_ue()?);
        }

        let mut pic_order_cnt_lsb = None;
        let mut delta_pic_order_cnt_bottom = None;
        let mut delta_pic_order_cnt = [None, None];

        if sps.pic_order_cnt_type == 0 {
            let lsb_bits = sps.log2_max_pic_order_cnt_lsb_minus4 + 4;
            pic_order_cnt_lsb = Some(r.read_bits(lsb_bits)?);
            if pps.bottom_field_pic_order_in_frame_present_flag && !field_pic_flag {
                delta_pic_order_cnt_bottom = Some(r.read_se()?);
            }
        } else if sps.pic_order_cnt_type == 1 && !sps.delta_pic_order_always_zero_flag {
            delta_pic_order_cnt[0] = Some(r.read_se()?);
            if pps.bottom_field_pic_order_in_frame_present_flag && !field_pic_flag {
                delta_pic_order_cnt[1] = Some(r.read_se()?);
            }
        }

        Ok(SliceHeader {
            frame_num,
            pic_parameter_set_id,
            field_pic_flag,
            bottom_field_flag,
            nal_ref_idc: nal.nal_ref_idc,
            is_idr,
            idr_pic_id,
            pic_order_cnt_lsb,
            delta_pic_order_cnt_bottom,
            delta_pic_order_cnt,
        })
    }
}

/// The 9-condition "new picture" predicate of `spec.md` §4.3.
pub fn is_new_picture(prev: &SliceHeader, cur: &SliceHeader, sps: &Sps) -> bool {
    if cur.frame_num != prev.frame_num {
        return true;
    }
    if cur.pic_parameter_set_id != prev.pic_parameter_set_id {
        return true;
    }
    if cur.field_pic_flag != prev.field_pic_flag {
        return true;
    }
    if sps.frame_mbs_only_flag && cur.field_pic_flag && prev.field_pic_flag {
        // Unreachable in a strictly conformant stream (field_pic_flag
        // implies !frame_mbs_only_flag), kept to mirror the predicate as
        // specified.
        if cur.bottom_field_flag != prev.bottom_field_flag {
            return true;
        }
    }
    if (cur.nal_ref_idc == 0) != (prev.nal_ref_idc == 0) {
        return true;
    }
    if sps.pic_order_cnt_type == 0
        && (cur.pic_order_cnt_lsb != prev.pic_order_cnt_lsb
            || cur.delta_pic_order_cnt_bottom != prev.delta_pic_order_cnt_bottom)
    {
        return true;
    }
    if sps.pic_order_cnt_type == 1 && cur.delta_pic_order_cnt != prev.delta_pic_order_cnt {
        return true;
    }
    if cur.is_idr != prev.is_idr {
        return true;
    }
    if cur.is_idr && prev.is_idr && cur.idr_pic_id != prev.idr_pic_id {
        return true;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::h264::nal::NalUnitType;

    fn bits_to_bytes(bits: &str) -> Vec<u8> {
        let mut padded = bits.to_string();
        while padded.len() % 8 != 0 {
            padded.push('0');
        }
        padded
            .as_bytes()
            .chunks(8)
            .map(|chunk| u8::from_str_radix(std::str::from_utf8(chunk).unwrap(), 2).unwrap())
            .collect()
    }

    fn base_sps() -> Sps {
        Sps {
            seq_parameter_set_id: 0,
            profile_idc: 66,
            level_idc: 30,
            chroma_format_idc: 1,
            bit_depth_luma_minus8: 0,
            bit_depth_chroma_minus8: 0,
            log2_max_frame_num_minus4: 0,
            pic_order_cnt_type: 0,
            log2_max_pic_order_cnt_lsb_minus4: 0,
            delta_pic_order_always_zero_flag: false,
            frame_mbs_only_flag: true,
            width: 1920,
            height: 1080,
            frame_rate: None,
            clock_ratio: None,
        }
    }

    fn base_pps() -> Pps {
        Pps {
            pic_parameter_set_id: 0,
            seq_parameter_set_id: 0,
            bottom_field_pic_order_in_frame_present_flag: false,
        }
    }

    fn header(frame_num: u32, pic_order_cnt_lsb: u32, is_idr: bool, nal_ref_idc: u8) -> SliceHeader {
        SliceHeader {
            frame_num,
            pic_parameter_set_id: 0,
            field_pic_flag: false,
            bottom_field_flag: false,
            nal_ref_idc,
            is_idr,
            idr_pic_id: if is_idr { Some(0) } else { None },
            pic_order_cnt_lsb: Some(pic_order_cnt_lsb),
            delta_pic_order_cnt_bottom: None,
            delta_pic_order_cnt: [None, None],
        }
    }

    #[test]
    fn same_frame_num_and_poc_is_not_new_picture() {
        let sps = base_sps();
        let a = header(0, 0, false, 1);
        let b = header(0, 0, false, 1);
        assert!(!is_new_picture(&a, &b, &sps));
    }

    #[test]
    fn differing_frame_num_is_new_picture() {
        let sps = base_sps();
        let a = header(0, 0, false, 1);
        let b = header(1, 2, false, 1);
        assert!(is_new_picture(&a, &b, &sps));
    }

    #[test]
    fn differing_poc_lsb_is_new_picture() {
        let sps = base_sps();
        let a = header(0, 0, false, 1);
        let b = header(0, 2, false, 1);
        assert!(is_new_picture(&a, &b, &sps));
    }

    #[test]
    fn idr_to_non_idr_transition_is_new_picture() {
        let sps = base_sps();
        let a = header(0, 0, true, 1);
        let b = header(0, 0, false, 1);
        assert!(is_new_picture(&a, &b, &sps));
    }

    #[test]
    fn differing_idr_pic_id_between_idrs_is_new_picture() {
        let sps = base_sps();
        let mut a = header(0, 0, true, 1);
        a.idr_pic_id = Some(1);
        let mut b = header(0, 0, true, 1);
        b.idr_pic_id = Some(2);
        assert!(is_new_picture(&a, &b, &sps));
    }

    #[test]
    fn nal_ref_idc_zero_transition_is_new_picture() {
        let sps = base_sps();
        let a = header(0, 0, false, 0);
        let b = header(0, 0, false, 1);
        assert!(is_new_picture(&a, &b, &sps));
    }

    #[test]
    fn parses_minimal_non_idr_slice_header() {
        let mut sps_table = BTreeMap::new();
        sps_table.insert(0, base_sps());
        let mut pps_table = BTreeMap::new();
        pps_table.insert(0, base_pps());
        let nal = NalHeader {
            nal_ref_idc: 1,
            nal_unit_type: NalUnitType::SliceNonIdr,
        };
        // first_mb_in_slice=0 ("1"), slice_type=0 ("1"), pps_id=0 ("1"),
        // frame_num (4 bits) = 0000, pic_order_cnt_lsb (4 bits) = 0101
        let bits = "1110000".to_string() + "0101";
        let rbsp = bits_to_bytes(&bits);
        let header = SliceHeader::parse(nal, &rbsp, &pps_table, &sps_table).unwrap();
        assert_eq!(header.frame_num, 0);
        assert_eq!(header.pic_order_cnt_lsb, Some(5));
        assert!(!header.is_idr);
    }

    #[test]
    fn unknown_pic_parameter_set_id_is_an_error() {
        let sps_table: BTreeMap<u32, Sps> = BTreeMap::new();
        let pps_table: BTreeMap<u32, Pps> = BTreeMap::new();
        let nal = NalHeader {
            nal_ref_idc: 1,
            nal_unit_type: NalUnitType::SliceNonIdr,
        };
        let bits = "1110000".to_string() + "0101";
        let rbsp = bits_to_bytes(&bits);
        assert!(SliceHeader::parse(nal, &rbsp, &pps_table, &sps_table).is_err());
    }
}
