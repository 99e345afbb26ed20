use crate::types::CipherSuite;

/// Pick the session suite. The server alone decides.
///
/// The first post-quantum suite in server order that the client offered
/// wins. Failing that, the first classical suite in server order.
pub fn select_cipher_suite(
    server_preference: &[CipherSuite],
    offered: &[CipherSuite],
) -> Option<CipherSuite> {
    let mutual = || {
        server_preference
            .iter()
            .copied()
            .filter(|s| s.is_known() && offered.contains(s))
    };

    mutual()
        .find(|s| s.is_post_quantum())
        .or_else(|| mutual().next())
}
