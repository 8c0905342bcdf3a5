//! CRC-16 used by OTP frames (ISO 13239, reflected polynomial 0x8408)

/// Residual left by a CRC over data followed by its complemented checksum
pub const CRC_OK_RESIDUAL: u16 = 0xF0B8;

/// Compute the frame checksum over `data`
pub fn calculate_crc(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for &byte in data {
        crc ^= u16::from(byte);
        for _ in 0..8 {
            let lsb = crc & 1;
            crc >>= 1;
            if lsb != 0 {
                crc ^= 0x8408;
            }
        }
    }
    crc
}

/// Whether `data` ends in a valid complemented checksum
pub fn check_crc(data: &[u8]) -> bool {
    calculate_crc(data) == CRC_OK_RESIDUAL
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_vector() {
        assert_eq!(calculate_crc(&[0, 1, 2, 3, 4]), 62919);
        assert_eq!(calculate_crc(&[]), 0xFFFF);
    }

    #[test]
    fn test_complemented_crc_checks() {
        let samples: [&[u8]; 4] = [&[], &[0x00], b"hello world", &[0xFF; 64]];
        for data in samples {
            let crc = 0xFFFF - calculate_crc(data);
            let mut framed = data.to_vec();
            framed.extend_from_slice(&crc.to_le_bytes());
            assert!(check_crc(&framed), "{}", hex::encode(data));

            *framed.last_mut().unwrap() ^= 0x01;
            assert!(!check_crc(&framed));
        }
    }
}
