//! Bounds-checked little-endian cursor over a datagram payload

use bytes::Buf;

use crate::types::{Quat, Vec3};
use crate::{NatNetError, Result};

/// Cursor over a payload.
///
/// Every read checks the remaining length first, so a truncated or lying payload
/// yields [`NatNetError::MalformedPacket`] instead of a panic.
#[derive(Debug, Clone)]
pub struct PacketReader<'a> {
    remaining: &'a [u8],
    total: usize,
    context: &'static str,
}

impl<'a> PacketReader<'a> {
    /// Create a reader; `context` names the record being decoded in error messages.
    pub fn new(data: &'a [u8], context: &'static str) -> Self {
        Self { remaining: data, total: data.len(), context }
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.remaining.len()
    }

    /// Bytes consumed so far.
    pub fn position(&self) -> usize {
        self.total - self.remaining.len()
    }

    fn ensure(&self, needed: usize, what: &str) -> Result<()> {
        if self.remaining.len() < needed {
            return Err(NatNetError::malformed(
                self.context,
                format!(
                    "insufficient data for {} at offset {} (need {} bytes, have {})",
                    what,
                    self.position(),
                    needed,
                    self.remaining.len()
                ),
            ));
        }
        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        self.ensure(1, "u8")?;
        Ok(self.remaining.get_u8())
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        self.ensure(2, "u16")?;
        Ok(self.remaining.get_u16_le())
    }

    pub fn read_i16(&mut self) -> Result<i16> {
        self.ensure(2, "i16")?;
        Ok(self.remaining.get_i16_le())
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        self.ensure(4, "i32")?;
        Ok(self.remaining.get_i32_le())
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        self.ensure(4, "f32")?;
        Ok(self.remaining.get_f32_le())
    }

    pub fn read_vec3(&mut self) -> Result<Vec3> {
        self.ensure(12, "position")?;
        let x = self.remaining.get_f32_le();
        let y = self.remaining.get_f32_le();
        let z = self.remaining.get_f32_le();
        Ok(Vec3::new(x, y, z))
    }

    pub fn read_quat(&mut self) -> Result<Quat> {
        self.ensure(16, "orientation")?;
        let x = self.remaining.get_f32_le();
        let y = self.remaining.get_f32_le();
        let z = self.remaining.get_f32_le();
        let w = self.remaining.get_f32_le();
        Ok(Quat::new(x, y, z, w))
    }

    /// Take the next `len` bytes as a slice.
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        self.ensure(len, "byte block")?;
        let (head, tail) = self.remaining.split_at(len);
        self.remaining = tail;
        Ok(head)
    }

    pub fn read_version(&mut self) -> Result<[u8; 4]> {
        let bytes = self.read_bytes(4)?;
        Ok([bytes[0], bytes[1], bytes[2], bytes[3]])
    }

    /// Read a null-terminated string and consume its terminator.
    pub fn read_cstring(&mut self) -> Result<String> {
        let Some(end) = self.remaining.iter().position(|&b| b == 0) else {
            return Err(NatNetError::malformed(
                self.context,
                format!("unterminated string at offset {}", self.position()),
            ));
        };
        let text = String::from_utf8_lossy(&self.remaining[..end]).into_owned();
        self.remaining = &self.remaining[end + 1..];
        Ok(text)
    }

    /// Read a string stored in a fixed-width, null-padded field.
    pub fn read_fixed_cstring(&mut self, width: usize) -> Result<String> {
        let field = self.read_bytes(width)?;
        let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
        Ok(String::from_utf8_lossy(&field[..end]).into_owned())
    }

    /// Read a record count.
    ///
    /// Negative counts, and counts that could not fit in the remaining payload
    /// given `min_record_size` bytes per record, are rejected before any
    /// allocation happens.
    pub fn read_count(&mut self, what: &str, min_record_size: usize) -> Result<usize> {
        let offset = self.position();
        let raw = self.read_i32()?;
        let count = usize::try_from(raw).map_err(|_| {
            NatNetError::malformed(
                self.context,
                format!("negative {} count {} at offset {}", what, raw, offset),
            )
        })?;

        let capacity = self.remaining.len() / min_record_size.max(1);
        if count > capacity {
            return Err(NatNetError::malformed(
                self.context,
                format!(
                    "{} count {} at offset {} exceeds what {} remaining bytes can hold",
                    what,
                    count,
                    offset,
                    self.remaining.len()
                ),
            ));
        }
        Ok(count)
    }
}
