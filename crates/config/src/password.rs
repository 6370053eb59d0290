//! AES-128-CBC/PKCS7 password encryption, matching the legacy keyfile format
//! (§4.1, §6): a 16-byte key and a 16-byte IV, each hex-encoded on its own
//! line of a root-only keyfile. `encrypt`/`decrypt` operate on bytes and know
//! nothing about which config key they're protecting.

use aes::Aes128;
use cbc::{Decryptor, Encryptor};
use cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};

use crate::error::ConfigError;

type Aes128CbcEnc = Encryptor<Aes128>;
type Aes128CbcDec = Decryptor<Aes128>;

/// Key material read from the keyfile: 16-byte AES-128 key and IV.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyMaterial {
    pub key: [u8; 16],
    pub iv: [u8; 16],
}

impl KeyMaterial {
    /// Parses the two-hex-line keyfile format (§6): first line the key,
    /// second the IV, each decoding to exactly 16 bytes.
    pub fn parse(contents: &str, path: &std::path::Path) -> Result<Self, ConfigError> {
        let mut lines = contents.lines();
        let key_hex = lines.next().unwrap_or("").trim();
        let iv_hex = lines.next().unwrap_or("").trim();
        if key_hex.is_empty() || iv_hex.is_empty() {
            return Err(ConfigError::MalformedKeyfile {
                path: path.to_path_buf(),
            });
        }
        let key_bytes = hex::decode(key_hex).map_err(|_| ConfigError::MalformedKeyfile {
            path: path.to_path_buf(),
        })?;
        let iv_bytes = hex::decode(iv_hex).map_err(|_| ConfigError::MalformedKeyfile {
            path: path.to_path_buf(),
        })?;
        let key: [u8; 16] = key_bytes
            .try_into()
            .map_err(|_| ConfigError::MalformedKeyfile { path: path.to_path_buf() })?;
        let iv: [u8; 16] = iv_bytes
            .try_into()
            .map_err(|_| ConfigError::MalformedKeyfile { path: path.to_path_buf() })?;
        Ok(Self { key, iv })
    }

    pub fn read_from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&contents, path)
    }
}

/// Encrypts `plaintext` with PKCS7 padding, returning raw ciphertext bytes
/// (callers hex-encode for storage in a config value).
pub fn encrypt(key: &KeyMaterial, plaintext: &[u8]) -> Vec<u8> {
    Aes128CbcEnc::new(&key.key.into(), &key.iv.into()).encrypt_padded_vec_mut::<Pkcs7>(plaintext)
}

/// Decrypts `ciphertext`, stripping PKCS7 padding. `ciphertext` is the raw
/// bytes (already hex-decoded by the caller, per §4.1's
/// "hex-encoded AES-128-CBC over a PKCS#7-padded plaintext").
pub fn decrypt(key: &KeyMaterial, ciphertext: &[u8]) -> Result<Vec<u8>, ConfigError> {
    Aes128CbcDec::new(&key.key.into(), &key.iv.into())
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|e| ConfigError::Decrypt(e.to_string()))
}

/// Decrypts a hex-encoded ciphertext directly into a UTF-8 password, the
/// shape config values actually arrive in (`encrypted_password = <hex>`).
pub fn decrypt_hex_to_string(key: &KeyMaterial, hex_ciphertext: &str) -> Result<String, ConfigError> {
    let bytes = hex::decode(hex_ciphertext.trim()).map_err(|e| ConfigError::Decrypt(e.to_string()))?;
    let plain = decrypt(key, &bytes)?;
    String::from_utf8(plain).map_err(|e| ConfigError::Decrypt(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_key() -> KeyMaterial {
        KeyMaterial {
            key: [0x11; 16],
            iv: [0x22; 16],
        }
    }

    #[test]
    fn encrypt_then_decrypt_round_trips() {
        let key = sample_key();
        for plaintext in ["", "a", "hunter2", "a much longer password with spaces!!"] {
            let cipher = encrypt(&key, plaintext.as_bytes());
            let recovered = decrypt(&key, &cipher).expect("decrypt");
            assert_eq!(recovered, plaintext.as_bytes());
        }
    }

    #[test]
    fn keyfile_parses_two_hex_lines() {
        let contents = format!("{}\n{}\n", hex::encode([0x11; 16]), hex::encode([0x22; 16]));
        let parsed = KeyMaterial::parse(&contents, std::path::Path::new("/var/lib/virt-who/key")).unwrap();
        assert_eq!(parsed, sample_key());
    }

    #[test]
    fn keyfile_rejects_missing_lines() {
        let err = KeyMaterial::parse("onlyoneline\n", std::path::Path::new("/key")).unwrap_err();
        assert!(matches!(err, ConfigError::MalformedKeyfile { .. }));
    }

    #[test]
    fn decrypt_hex_round_trips_through_config_value_shape() {
        let key = sample_key();
        let cipher = encrypt(&key, b"s3cr3t");
        let hex_value = hex::encode(&cipher);
        let recovered = decrypt_hex_to_string(&key, &hex_value).unwrap();
        assert_eq!(recovered, "s3cr3t");
    }
}
