use sha1::{Digest, Sha1};
use std::net::IpAddr;

use crate::torrent::InfoHash;

/// `k` in BEP-6.
pub const ALLOWED_FAST_SET_SIZE: usize = 10;

const IP_MASK: u32 = 0xFFFF_FF00;
const WORDS_PER_DIGEST: usize = 5;

/// Computes the allowed-fast set a peer at `peer_ip` gets for a torrent
/// ([BEP-6]).
///
/// The result holds `min(10, piece_count)` distinct piece indices in the
/// order they were generated and is identical for every peer in the same
/// /24. IPv6 peers are keyed on their first four address bytes.
///
/// ```
/// use rswarm::codec::allowed_fast;
/// use rswarm::torrent::InfoHash;
///
/// let info_hash = InfoHash::new([0xAA; 20]);
/// let set = allowed_fast(1313, "80.4.4.200".parse().unwrap(), &info_hash);
/// assert_eq!(set.len(), 10);
/// assert_eq!(&set[..9], &[1059, 431, 808, 1217, 287, 376, 1188, 353, 508]);
/// ```
///
/// [BEP-6]: http://bittorrent.org/beps/bep_0006.html
pub fn allowed_fast(piece_count: u32, peer_ip: IpAddr, info_hash: &InfoHash) -> Vec<u32> {
    let wanted = ALLOWED_FAST_SET_SIZE.min(piece_count as usize);
    let mut set = Vec::with_capacity(wanted);
    if wanted == 0 {
        return set;
    }

    let ip = match peer_ip {
        IpAddr::V4(ip) => u32::from(ip),
        IpAddr::V6(ip) => {
            let o = ip.octets();
            u32::from_be_bytes([o[0], o[1], o[2], o[3]])
        }
    };

    let mut seed = Vec::with_capacity(24);
    seed.extend_from_slice(&(ip & IP_MASK).to_be_bytes());
    seed.extend_from_slice(info_hash.as_bytes());

    while set.len() < wanted {
        let digest = Sha1::digest(&seed);

        for word in digest.chunks_exact(4).take(WORDS_PER_DIGEST) {
            if set.len() == wanted {
                break;
            }
            let index = u32::from_be_bytes([word[0], word[1], word[2], word[3]]) % piece_count;
            if !set.contains(&index) {
                set.push(index);
            }
        }

        seed = digest.to_vec();
    }

    set
}
