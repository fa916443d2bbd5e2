/// Binary Merkle root over transaction digests for block headers.
///
/// The empty list produces the all-zero root; a single leaf is its own root;
/// an odd node at any level is hashed with itself.
pub fn merkle_root(leaves: &[[u8; 32]]) -> [u8; 32] {
    if leaves.is_empty() {
        return [0u8; 32];
    }

    let mut current: Vec<[u8; 32]> = leaves.to_vec();
    while current.len() > 1 {
        let mut next = Vec::with_capacity((current.len() + 1) / 2);
        for pair in current.chunks(2) {
            let hash = if pair.len() == 2 {
                hash_pair(&pair[0], &pair[1])
            } else {
                hash_pair(&pair[0], &pair[0])
            };
            next.push(hash);
        }
        current = next;
    }
    current[0]
}

fn hash_pair(left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    hasher.update(b"lyceum-merkle-v1:");
    hasher.update(left);
    hasher.update(right);
    *hasher.finalize().as_bytes()
}
