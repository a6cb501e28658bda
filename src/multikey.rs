// did:key multikey decoding and verification-method formatting

use crate::constants::{
    BASE58_MULTIBASE_PREFIX, DID_KEY_PREFIX, P256_CONTEXT, P256_DID_PREFIX, P256_JWT_ALG,
    SECP256K1_CONTEXT, SECP256K1_DID_PREFIX, SECP256K1_JWT_ALG,
};
use crate::error::{MirageError, Result};

/// A decoded did:key, ready to be emitted as a verification method.
///
/// `public_key_multibase` is the original string with only the `did:key:`
/// prefix stripped; the `z` multibase tag stays, as required by the DID
/// document format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyAndContext {
    pub jwt_alg: &'static str,
    pub context: &'static str,
    pub public_key_multibase: String,
}

/// Strip the `did:key:` prefix, leaving the multibase string.
fn extract_multikey(key: &str) -> Result<&str> {
    key.strip_prefix(DID_KEY_PREFIX)
        .ok_or(MirageError::NotADidKey)
}

/// Decode the `z`-tagged base58btc payload to multicodec-prefixed bytes.
fn extract_prefixed_bytes(multikey: &str) -> Result<Vec<u8>> {
    let encoded = multikey
        .strip_prefix(BASE58_MULTIBASE_PREFIX)
        .ok_or(MirageError::BadMultibasePrefix)?;

    bs58::decode(encoded)
        .into_vec()
        .map_err(|_| MirageError::BadMultibasePrefix)
}

/// Decode a did:key string and classify its curve by multicodec prefix.
///
/// The remaining bytes are handed to the curve implementation so that a
/// well-formed prefix with a garbage point still fails.
pub fn format_key_and_context(key: &str) -> Result<KeyAndContext> {
    let multikey = extract_multikey(key)?;
    let decoded = extract_prefixed_bytes(multikey)?;

    let (jwt_alg, context) = if decoded.starts_with(&P256_DID_PREFIX) {
        p256::PublicKey::from_sec1_bytes(&decoded[2..])
            .map_err(|_| MirageError::UnsupportedCurve)?;
        (P256_JWT_ALG, P256_CONTEXT)
    } else if decoded.starts_with(&SECP256K1_DID_PREFIX) {
        k256::PublicKey::from_sec1_bytes(&decoded[2..])
            .map_err(|_| MirageError::UnsupportedCurve)?;
        (SECP256K1_JWT_ALG, SECP256K1_CONTEXT)
    } else {
        return Err(MirageError::UnsupportedCurve);
    };

    Ok(KeyAndContext {
        jwt_alg,
        context,
        public_key_multibase: multikey.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    // secp256k1 generator point, compressed
    const K256_POINT: [u8; 33] = [
        0x02, 0x79, 0xbe, 0x66, 0x7e, 0xf9, 0xdc, 0xbb, 0xac, 0x55, 0xa0, 0x62, 0x95, 0xce, 0x87,
        0x0b, 0x07, 0x02, 0x9b, 0xfc, 0xdb, 0x2d, 0xce, 0x28, 0xd9, 0x59, 0xf2, 0x81, 0x5b, 0x16,
        0xf8, 0x17, 0x98,
    ];

    // P-256 generator point, compressed
    const P256_POINT: [u8; 33] = [
        0x03, 0x6b, 0x17, 0xd1, 0xf2, 0xe1, 0x2c, 0x42, 0x47, 0xf8, 0xbc, 0xe6, 0xe5, 0x63, 0xa4,
        0x40, 0xf2, 0x77, 0x03, 0x7d, 0x81, 0x2d, 0xeb, 0x33, 0xa0, 0xf4, 0xa1, 0x39, 0x45, 0xd8,
        0x98, 0xc2, 0x96,
    ];

    fn did_key_for(prefix: [u8; 2], point: &[u8]) -> String {
        let mut bytes = prefix.to_vec();
        bytes.extend_from_slice(point);
        format!("did:key:z{}", bs58::encode(bytes).into_string())
    }

    #[test]
    fn test_decode_secp256k1() {
        let key = did_key_for(SECP256K1_DID_PREFIX, &K256_POINT);
        let kac = format_key_and_context(&key).unwrap();
        assert_eq!(kac.jwt_alg, "ES256K");
        assert_eq!(kac.context, SECP256K1_CONTEXT);
    }

    #[test]
    fn test_decode_p256() {
        let key = did_key_for(P256_DID_PREFIX, &P256_POINT);
        let kac = format_key_and_context(&key).unwrap();
        assert_eq!(kac.jwt_alg, "ES256");
        assert_eq!(kac.context, P256_CONTEXT);
    }

    #[test]
    fn test_multibase_round_trip() {
        // The emitted publicKeyMultibase is the input minus the did:key: prefix
        let key = did_key_for(SECP256K1_DID_PREFIX, &K256_POINT);
        let kac = format_key_and_context(&key).unwrap();
        assert_eq!(format!("did:key:{}", kac.public_key_multibase), key);
        assert!(kac.public_key_multibase.starts_with('z'));
    }

    #[test]
    fn test_not_a_did_key() {
        assert!(matches!(
            format_key_and_context("did:plc:abc"),
            Err(MirageError::NotADidKey)
        ));
    }

    #[test]
    fn test_bad_multibase_prefix() {
        assert!(matches!(
            format_key_and_context("did:key:Qabcdef"),
            Err(MirageError::BadMultibasePrefix)
        ));
    }

    #[test]
    fn test_unsupported_curve() {
        // ed25519 multicodec prefix (0xed 0x01) is not supported
        let mut bytes = vec![0xed, 0x01];
        bytes.extend_from_slice(&[0u8; 32]);
        let key = format!("did:key:z{}", bs58::encode(bytes).into_string());
        assert!(matches!(
            format_key_and_context(&key),
            Err(MirageError::UnsupportedCurve)
        ));
    }

    #[test]
    fn test_garbage_point_rejected() {
        let mut bytes = SECP256K1_DID_PREFIX.to_vec();
        bytes.extend_from_slice(&[0xff; 33]);
        let key = format!("did:key:z{}", bs58::encode(bytes).into_string());
        assert!(format_key_and_context(&key).is_err());
    }
}
