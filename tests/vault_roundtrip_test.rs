// Credential vault encryption tests
// Round-trip, legacy plaintext fallback, and key validation

use base64::Engine;
use hopsync_backend_core::services::CredentialVault;

fn test_key() -> String {
    base64::engine::general_purpose::STANDARD.encode([7u8; 32])
}

#[test]
fn test_encrypt_decrypt_round_trip() {
    let vault = CredentialVault::new(&test_key()).unwrap();
    let token = "ya29.a0AfH6SMBx-long-bearer-token-value";

    let stored = vault.encrypt(token).unwrap();
    assert_ne!(stored, token);
    assert_eq!(vault.decrypt(&stored), token);
}

#[test]
fn test_legacy_plaintext_passes_through() {
    let vault = CredentialVault::new(&test_key()).unwrap();

    // Rows written before encryption was introduced hold raw tokens;
    // they must keep working unchanged
    let legacy = "1//0gLegacyRefreshTokenNotEncrypted";
    assert_eq!(vault.decrypt(legacy), legacy);
}

#[test]
fn test_tampered_ciphertext_falls_back_to_input() {
    let vault = CredentialVault::new(&test_key()).unwrap();
    let stored = vault.encrypt("secret-token").unwrap();

    let mut tampered = stored.into_bytes();
    let last = tampered.len() - 1;
    tampered[last] = if tampered[last] == b'A' { b'B' } else { b'A' };
    let tampered = String::from_utf8(tampered).unwrap();

    // Failure to open means "treat as legacy", never an error
    assert_eq!(vault.decrypt(&tampered), tampered);
}

#[test]
fn test_empty_string_stays_empty() {
    let vault = CredentialVault::new(&test_key()).unwrap();
    assert_eq!(vault.encrypt("").unwrap(), "");
    assert_eq!(vault.decrypt(""), "");
}

#[test]
fn test_wrong_length_key_rejected() {
    let short = base64::engine::general_purpose::STANDARD.encode([1u8; 16]);
    assert!(CredentialVault::new(&short).is_err());
    assert!(CredentialVault::new("").is_err());
    assert!(CredentialVault::new("not-base64!!!").is_err());
}

#[test]
fn test_two_vaults_same_key_interoperate() {
    let a = CredentialVault::new(&test_key()).unwrap();
    let b = CredentialVault::new(&test_key()).unwrap();

    let stored = a.encrypt("shared-secret").unwrap();
    assert_eq!(b.decrypt(&stored), "shared-secret");
}
