//! Docker image constants for devbox containers.

/// Docker image for the go-ethereum dev node.
pub const GETH_IMAGE: &str = "ethereum/client-go:v1.14.5";
/// Docker image for the Transeptor bundler.
pub const TRANSEPTOR_IMAGE: &str = "transeptorlabs/bundler:0.6.2-alpha.0";
/// Docker image for the eth-infinitism reference bundler.
pub const AA_BUNDLER_IMAGE: &str = "accountabstraction/bundler:0.7.0";

/// Tag suffix that is always re-pulled, even when cached locally.
pub const FLOATING_TAG: &str = "latest";

/// Returns true when the image reference points at a floating tag.
///
/// A reference without an explicit tag resolves to `latest` on the engine side and counts as
/// floating too.
pub fn is_floating(image_ref: &str) -> bool {
    let name = image_ref.rsplit('/').next().unwrap_or(image_ref);
    match name.split_once(':') {
        Some((_, tag)) => tag == FLOATING_TAG,
        None => true,
    }
}
