//! SPIR-V bytecode loading

use crate::assets::AssetError;
use std::io::Cursor;
use std::path::Path;

const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Read a SPIR-V file into 32-bit words
pub fn read_spirv(path: impl AsRef<Path>) -> Result<Vec<u32>, AssetError> {
    let path = path.as_ref();
    let bytes = std::fs::read(path)
        .map_err(|e| AssetError::LoadFailed(format!("Failed to read shader {}: {}", path.display(), e)))?;
    parse_spirv(&bytes).map_err(|e| match e {
        AssetError::InvalidData(reason) => AssetError::InvalidData(format!("{}: {}", path.display(), reason)),
        other => other,
    })
}

/// Convert raw bytes into SPIR-V words, rejecting truncated or foreign data
pub fn parse_spirv(bytes: &[u8]) -> Result<Vec<u32>, AssetError> {
    let words = ash::util::read_spv(&mut Cursor::new(bytes))
        .map_err(|e| AssetError::InvalidData(format!("malformed SPIR-V: {}", e)))?;

    match words.first() {
        Some(&SPIRV_MAGIC) => Ok(words),
        Some(other) => Err(AssetError::InvalidData(format!("bad SPIR-V magic number {:#010x}", other))),
        None => Err(AssetError::InvalidData("empty SPIR-V module".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_header_accepted() {
        let mut bytes = SPIRV_MAGIC.to_le_bytes().to_vec();
        bytes.extend_from_slice(&0x0001_0000u32.to_le_bytes());
        let words = parse_spirv(&bytes).unwrap();
        assert_eq!(words, vec![SPIRV_MAGIC, 0x0001_0000]);
    }

    #[test]
    fn test_truncated_bytecode_rejected() {
        let bytes = [0x03, 0x02, 0x23, 0x07, 0x00];
        assert!(matches!(parse_spirv(&bytes), Err(AssetError::InvalidData(_))));
    }

    #[test]
    fn test_wrong_magic_rejected() {
        let bytes = 0xdead_beefu32.to_le_bytes();
        assert!(matches!(parse_spirv(&bytes), Err(AssetError::InvalidData(_))));
    }

    #[test]
    fn test_empty_rejected() {
        assert!(parse_spirv(&[]).is_err());
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(read_spirv("missing.spv"), Err(AssetError::LoadFailed(_))));
    }
}
