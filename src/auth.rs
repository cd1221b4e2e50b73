//! Submission authentication: canonical message construction and
//! signature verification against a per-user shared secret.
//!
//! The digest primitive is pluggable behind the `digest::Digest`
//! trait; `ReportDigest` fixes the wire default. Existing runners sign
//! with MD5, so that stays the default until the fleet rolls over.

use digest::Digest;
use md5::Md5;

/// Digest used on the wire today. 128-bit, 32 hex characters.
pub type ReportDigest = Md5;

/// Hex length of a valid signature under `D`.
pub fn signature_len<D: Digest>() -> usize {
    2 * <D as Digest>::output_size()
}

/// The signed fields of one submission, borrowed from the validated
/// request. The client signature itself is deliberately absent: it
/// cannot be part of what it signs.
#[derive(Debug, Clone, Copy)]
pub struct SignedFields<'a> {
    pub project_name: &'a str,
    pub start: i64,
    pub env: i64,
    pub depend: i64,
    pub build: i64,
    pub test: i64,
    pub install: i64,
    pub distcheck: i64,
    pub log: &'a str,
    pub fetchhead: &'a str,
    pub unamem: &'a str,
    pub unamen: &'a str,
    pub unamer: &'a str,
    pub unames: &'a str,
    pub unamev: &'a str,
}

/// Serialize the signed fields into the exact byte string both sides
/// digest. The field order is fixed by the protocol and load-bearing;
/// the log is represented by its hex digest so the message stays
/// bounded and free of arbitrary client text.
pub fn canonical_message<D: Digest>(fields: &SignedFields, secret: &str) -> Vec<u8> {
    let log_digest = hex_digest::<D>(fields.log.as_bytes());
    format!(
        "project-name={}&\
         report-build={}&\
         report-distcheck={}&\
         report-env={}&\
         report-fetchhead={}&\
         report-depend={}&\
         report-install={}&\
         report-log={}&\
         report-start={}&\
         report-test={}&\
         report-unamem={}&\
         report-unamen={}&\
         report-unamer={}&\
         report-unames={}&\
         report-unamev={}&\
         user-apisecret={}",
        fields.project_name,
        fields.build,
        fields.distcheck,
        fields.env,
        fields.fetchhead,
        fields.depend,
        fields.install,
        log_digest,
        fields.start,
        fields.test,
        fields.unamem,
        fields.unamen,
        fields.unamer,
        fields.unames,
        fields.unamev,
        secret,
    )
    .into_bytes()
}

/// Compute the signature a runner holding `secret` would produce.
pub fn sign<D: Digest>(fields: &SignedFields, secret: &str) -> String {
    hex_digest::<D>(&canonical_message::<D>(fields, secret))
}

/// Check a client-supplied signature against the canonical message.
/// Fails closed: wrong length or any mismatch is a refusal. The hex
/// comparison is case-insensitive and constant-time over equal-length
/// inputs.
pub fn verify<D: Digest>(fields: &SignedFields, secret: &str, candidate: &str) -> bool {
    if candidate.len() != signature_len::<D>() {
        return false;
    }
    let expected = sign::<D>(fields, secret);
    ct_eq_ignore_ascii_case(expected.as_bytes(), candidate.as_bytes())
}

/// Lowercase hex digest of arbitrary bytes.
pub fn hex_digest<D: Digest>(bytes: &[u8]) -> String {
    hex::encode(D::digest(bytes))
}

fn ct_eq_ignore_ascii_case(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter()
        .zip(b.iter())
        .fold(0u8, |acc, (x, y)| {
            acc | (x.to_ascii_lowercase() ^ y.to_ascii_lowercase())
        })
        == 0
}
