// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! Big-endian bit reader over an RBSP buffer, plus emulation-prevention-byte
//! stripping.
//!
//! Exp-Golomb and fixed-width reads are hot in SPS/PPS/slice-header
//! parsing, so [`BitReader`] exposes both a checked path (`read_bits`,
//! `read_ue`, `read_se`) and an unchecked fast path (`read_bits_unchecked`)
//! for callers that have already bounds-checked the remaining payload.

use super::Error;

/// Strips `0x00 0x00 0x03` emulation-prevention sequences from a NALU
/// payload, producing an RBSP buffer (`spec.md` §4.3, glossary "RBSP").
///
/// Per the H.264 standard, only the third byte of a `00 00 03` run is
/// dropped; `03` remains if it is not preceded by two zero bytes.
pub fn strip_emulation_prevention(nalu_payload: &[u8]) -> Vec<u8> {
    let mut rbsp = Vec::with_capacity(nalu_payload.len());
    let mut zero_run = 0u32;
    for &byte in nalu_payload {
        if zero_run >= 2 && byte == 0x03 {
            zero_run = 0;
            continue;
        }
        if byte == 0 {
            zero_run += 1;
        } else {
            zero_run = 0;
        }
        rbsp.push(byte);
    }
    rbsp
}

/// Reads big-endian bits from an owned RBSP buffer.
pub struct BitReader<'a> {
    data: &'a [u8],
    /// Absolute bit position from the start of `data`.
    pos: usize,
}

impl<'a> BitReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        BitReader { data, pos: 0 }
    }

    pub fn bits_remaining(&self) -> usize {
        self.data.len() * 8 - self.pos
    }

    pub fn bit_position(&self) -> usize {
        self.pos
    }

    /// `true` once every bit has been consumed.
    pub fn is_exhausted(&self) -> bool {
        self.pos >= self.data.len() * 8
    }

    fn read_bit_checked(&mut self) -> Result<u32, Error> {
        if self.pos >= self.data.len() * 8 {
            return Err(Error::Error("bit reader ran past end of RBSP".into()));
        }
        // SAFETY: bounds checked above.
        Ok(unsafe { self.read_bit_unchecked() })
    }

    /// # Safety
    ///
    /// The caller must ensure at least one unread bit remains
    /// (`bits_remaining() > 0`).
    pub unsafe fn read_bit_unchecked(&mut self) -> u32 {
        let byte = self.data[self.pos / 8];
        let shift = 7 - (self.pos % 8);
        self.pos += 1;
        ((byte >> shift) & 1) as u32
    }

    /// Reads `n` bits (`n <= 32`) as an unsigned integer, checked.
    pub fn read_bits(&mut self, n: u32) -> Result<u32, Error> {
        debug_assert!(n <= 32);
        let mut value = 0u32;
        for _ in 0..n {
            value = (value << 1) | self.read_bit_checked()?;
        }
        Ok(value)
    }

    /// Unchecked fast path for [`BitReader::read_bits`].
    ///
    /// # Safety
    ///
    /// The caller must ensure at least `n` unread bits remain.
    pub unsafe fn read_bits_unchecked(&mut self, n: u32) -> u32 {
        let mut value = 0u32;
        for _ in 0..n {
            // SAFETY: forwarded from the caller's precondition.
            value = (value << 1) | unsafe { self.read_bit_unchecked() };
        }
        value
    }

    /// Exp-Golomb unsigned code (`ue(v)`).
    pub fn read_ue(&mut self) -> Result<u32, Error> {
        let mut leading_zeros = 0u32;
        while self.read_bit_checked()? == 0 {
            leading_zeros += 1;
            if leading_zeros > 32 {
                return Err(Error::Error("Exp-Golomb prefix too long".into()));
            }
        }
        if leading_zeros == 0 {
            return Ok(0);
        }
        let suffix = self.read_bits(leading_zeros)?;
        Ok((1u32 << leading_zeros) - 1 + suffix)
    }

    /// Exp-Golomb signed code (`se(v)`).
    pub fn read_se(&mut self) -> Result<i32, Error> {
        let code = self.read_ue()?;
        let magnitude = ((code + 1) / 2) as i32;
        if code % 2 == 1 {
            Ok(magnitude)
        } else {
            Ok(-magnitude)
        }
    }

    /// Reads a single flag bit as `bool`.
    pub fn read_flag(&mut self) -> Result<bool, Error> {
        Ok(self.read_bits(1)? != 0)
    }

    /// `true` if more RBSP trailing data remains beyond the `rbsp_stop_one_bit`
    /// marker, used by callers that stop parsing before consuming a whole
    /// NALU (e.g. once SPS fields of interest are extracted).
    pub fn more_rbsp_data(&self) -> bool {
        !self.is_exhausted()
    }
}
