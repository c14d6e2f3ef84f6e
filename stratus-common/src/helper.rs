use hmac::{Hmac, Mac};
use md5::{Digest, Md5};
use sha1::Sha1;

pub fn sign_hmac_sha1(secret: &str, str_to_sign: &str) -> Vec<u8> {
    type HmacSha1 = Hmac<Sha1>;
    let mut mac = HmacSha1::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(str_to_sign.as_bytes());
    mac.finalize().into_bytes().to_vec()
}

pub fn sign_hmac_sha1_hex(secret: &str, str_to_sign: &str) -> String {
    hex::encode(sign_hmac_sha1(secret, str_to_sign))
}

/// Hex digest, not base64: object-storage `ETag` headers use the hex form.
pub fn md5_hex(bytes: &[u8]) -> String {
    let mut hasher = Md5::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn md5_hex_test() {
        assert_eq!(md5_hex(b""), "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(md5_hex(b"hello world"), "5eb63bbbe01eeed093cb22bb8f5acdc3");
    }

    #[test]
    fn sign_hmac_sha1_hex_test() {
        let sig = sign_hmac_sha1_hex("secret", "GET\n1500000000\n/v1/acct/files/photo.jpg");
        assert_eq!(sig, "f67591e745d48a12fd2c248558539207488eab4a");
    }
}
