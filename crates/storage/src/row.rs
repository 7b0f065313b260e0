//! Fixed-width row encoding.
//!
//! ```text
//! [0..4]     id: u32 (big-endian)
//! [4]        username length
//! [5..37]    username bytes, zero padded
//! [37]       email length
//! [38..293]  email bytes, zero padded
//! ```

use std::fmt;

use crate::config::{
    EMAIL_MAX_LEN, EMAIL_OFFSET, EMAIL_SIZE, ID_OFFSET, ID_SIZE, ROW_SIZE, USERNAME_MAX_LEN,
    USERNAME_OFFSET, USERNAME_SIZE,
};
use crate::error::{Result, StorageError};

/// One record of the table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub id: u32,
    pub username: String,
    pub email: String,
}

impl Row {
    /// Build a row, rejecting fields that exceed their fixed capacity.
    pub fn new(id: u32, username: impl Into<String>, email: impl Into<String>) -> Result<Self> {
        let row = Self {
            id,
            username: username.into(),
            email: email.into(),
        };
        row.validate()?;
        Ok(row)
    }

    /// Check field lengths against the on-page capacities.
    pub fn validate(&self) -> Result<()> {
        check_len("username", &self.username, USERNAME_MAX_LEN)?;
        check_len("email", &self.email, EMAIL_MAX_LEN)
    }

    /// Encode into `buf`, which must be at least [`ROW_SIZE`] bytes.
    pub fn encode(&self, buf: &mut [u8]) -> Result<()> {
        self.validate()?;
        if buf.len() < ROW_SIZE {
            return Err(StorageError::corrupt(format!(
                "row buffer is {} bytes, expected {ROW_SIZE}",
                buf.len()
            )));
        }
        let buf = &mut buf[..ROW_SIZE];
        buf[ID_OFFSET..ID_OFFSET + ID_SIZE].copy_from_slice(&self.id.to_be_bytes());
        write_text(&mut buf[USERNAME_OFFSET..USERNAME_OFFSET + USERNAME_SIZE], &self.username);
        write_text(&mut buf[EMAIL_OFFSET..EMAIL_OFFSET + EMAIL_SIZE], &self.email);
        Ok(())
    }

    /// Encode into a freshly allocated block.
    pub fn to_bytes(&self) -> Result<[u8; ROW_SIZE]> {
        let mut buf = [0u8; ROW_SIZE];
        self.encode(&mut buf)?;
        Ok(buf)
    }

    /// Decode a row previously written by [`Row::encode`].
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < ROW_SIZE {
            return Err(StorageError::corrupt(format!(
                "row block is {} bytes, expected {ROW_SIZE}",
                buf.len()
            )));
        }
        let mut id = [0u8; ID_SIZE];
        id.copy_from_slice(&buf[ID_OFFSET..ID_OFFSET + ID_SIZE]);
        Ok(Self {
            id: u32::from_be_bytes(id),
            username: read_text(&buf[USERNAME_OFFSET..USERNAME_OFFSET + USERNAME_SIZE])?,
            email: read_text(&buf[EMAIL_OFFSET..EMAIL_OFFSET + EMAIL_SIZE])?,
        })
    }
}

/// The `select` output format.
impl fmt::Display for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} | {} | {}", self.id, self.email, self.username)
    }
}

fn check_len(field: &'static str, value: &str, max: usize) -> Result<()> {
    if value.len() > max {
        return Err(StorageError::ValueTooLong {
            field,
            len: value.len(),
            max,
        });
    }
    Ok(())
}

fn write_text(slot: &mut [u8], value: &str) {
    let bytes = value.as_bytes();
    slot.fill(0);
    slot[0] = bytes.len() as u8;
    slot[1..1 + bytes.len()].copy_from_slice(bytes);
}

fn read_text(slot: &[u8]) -> Result<String> {
    let len = slot[0] as usize;
    if len > slot.len() - 1 {
        return Err(StorageError::corrupt(format!(
            "text length {len} exceeds field capacity {}",
            slot.len() - 1
        )));
    }
    String::from_utf8(slot[1..1 + len].to_vec())
        .map_err(|e| StorageError::corrupt(format!("invalid utf-8 in row: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn roundtrip_simple_row() {
        let row = Row::new(1, "user1", "person1@example.com").unwrap();
        let decoded = Row::decode(&row.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded, row);
    }

    #[test]
    fn display_matches_select_format() {
        let row = Row::new(1, "user1", "person1@example.com").unwrap();
        assert_eq!(row.to_string(), "1 | person1@example.com | user1");
    }

    #[test]
    fn fields_at_capacity_are_accepted() {
        let row = Row::new(u32::MAX, "a".repeat(32), "b".repeat(255)).unwrap();
        let decoded = Row::decode(&row.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded, row);
    }

    #[test]
    fn long_username_is_rejected() {
        let err = Row::new(1, "a".repeat(33), "x@y.z").unwrap_err();
        assert!(matches!(
            err,
            StorageError::ValueTooLong {
                field: "username",
                len: 33,
                max: 32
            }
        ));
    }

    #[test]
    fn long_email_is_rejected_by_encode() {
        let row = Row {
            id: 1,
            username: "user".into(),
            email: "e".repeat(256),
        };
        let mut buf = [0xEEu8; ROW_SIZE];
        assert!(matches!(
            row.encode(&mut buf),
            Err(StorageError::ValueTooLong { field: "email", .. })
        ));
        assert!(buf.iter().all(|&b| b == 0xEE), "buffer must be untouched");
    }

    #[test]
    fn short_buffer_is_rejected_by_encode() {
        let row = Row::new(1, "u", "e").unwrap();
        let mut buf = [0u8; ROW_SIZE - 1];
        assert!(matches!(
            row.encode(&mut buf),
            Err(StorageError::Corrupt { .. })
        ));
        assert!(buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn capacity_counts_bytes_not_chars() {
        // 11 three-byte characters = 33 bytes.
        assert!(Row::new(1, "€".repeat(11), "e").is_err());
        assert!(Row::new(1, "€".repeat(10), "e").is_ok());
    }

    #[test]
    fn corrupt_length_byte_is_detected() {
        let mut buf = Row::new(1, "u", "e").unwrap().to_bytes().unwrap();
        buf[USERNAME_OFFSET] = 200;
        assert!(matches!(
            Row::decode(&buf),
            Err(StorageError::Corrupt { .. })
        ));
    }

    proptest! {
        #[test]
        fn decode_inverts_encode(
            id in any::<u32>(),
            username in "[a-zA-Z0-9_]{0,32}",
            email in "[a-z0-9@.\u{e9}]{0,120}",
        ) {
            let row = Row { id, username, email };
            prop_assume!(row.validate().is_ok());
            let decoded = Row::decode(&row.to_bytes().unwrap()).unwrap();
            prop_assert_eq!(decoded, row);
        }
    }
}
