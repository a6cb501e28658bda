// Constants for version and binary identification

/// Binary name used in user agents and log prefixes
pub const BINARY_NAME: &str = "mirage";

/// Package version from Cargo.toml (set at compile time)
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Returns the user agent string for HTTP requests
pub fn user_agent() -> String {
    format!("{}/{}", BINARY_NAME, VERSION)
}

// ============================================================================
// did:key Constants
// ============================================================================

/// Prefix every did:key string starts with
pub const DID_KEY_PREFIX: &str = "did:key:";

/// Multibase tag for base58btc
pub const BASE58_MULTIBASE_PREFIX: char = 'z';

/// Multicodec prefix identifying a P-256 public key
pub const P256_DID_PREFIX: [u8; 2] = [0x80, 0x24];

/// Multicodec prefix identifying a secp256k1 public key
pub const SECP256K1_DID_PREFIX: [u8; 2] = [0xe7, 0x01];

/// JWT algorithm identifier for P-256
pub const P256_JWT_ALG: &str = "ES256";

/// JWT algorithm identifier for secp256k1
pub const SECP256K1_JWT_ALG: &str = "ES256K";

/// Verification suite context for P-256 keys
pub const P256_CONTEXT: &str = "https://w3id.org/security/suites/ecdsa-2019/v1";

/// Verification suite context for secp256k1 keys
pub const SECP256K1_CONTEXT: &str = "https://w3id.org/security/suites/secp256k1-2019/v1";

/// Base contexts every DID document response starts with, in order
pub const RESPONSE_CONTEXT: [&str; 2] = [
    "https://www.w3.org/ns/did/v1",
    "https://w3id.org/security/multikey/v1",
];

// ============================================================================
// Lookup Tier Key Layout
// ============================================================================

/// Namespace prefix isolating mirage keys from other tenants
pub const LOOKUP_PREFIX: &str = "mirage/";

/// Key space for did -> handle entries
pub const DID_HANDLE_PREFIX: &str = "did_handle/";

/// Key space for handle -> did entries
pub const HANDLE_DID_PREFIX: &str = "handle_did/";

/// Key holding the export cursor
pub const AFTER_KEY: &str = "after";

// ============================================================================
// Export Loop Constants
// ============================================================================

/// Default PLC directory URL
pub const DEFAULT_PLC_ROOT: &str = "https://plc.directory";

/// Page size requested from the upstream export endpoint
pub const EXPORT_PAGE_LIMIT: usize = 1000;

/// Steady-state wait between export requests (milliseconds)
pub const EXPORT_WAIT_MS: u64 = 1000;

/// Wait between export requests while catching up (milliseconds)
pub const EXPORT_CATCHUP_WAIT_MS: u64 = 600;

/// Cursor older than this means the mirror is catching up (seconds)
pub const EXPORT_CATCHUP_THRESHOLD_SECS: i64 = 3600;

// ============================================================================
// Timeout Constants (in seconds)
// ============================================================================

/// HTTP request timeout for export fetches
pub const HTTP_EXPORT_TIMEOUT_SECS: u64 = 30;

/// HTTP request timeout for the well-known handle verification probe
pub const HTTP_VERIFIER_TIMEOUT_SECS: u64 = 2;
