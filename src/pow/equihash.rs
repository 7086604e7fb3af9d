// TWINS-Core/twins_chain_core/src/pow/equihash.rs
//! Equihash solution verification.
//!
//! A solution is `2^K` leaf indices forming a binary tree. Every internal
//! node at level `r` XORs the hashes of its two subtrees, and the result must
//! have its top `r * N/(K+1)` bits cleared. Siblings are canonically ordered
//! by their first leaf index so a solution has exactly one valid encoding.
//!
//! Only verification lives here. Verification is pure; an `EquihashVerifier`
//! can be shared across threads and reused for many candidate solutions over
//! the same input.

use blake2b_simd::{Params as Blake2bParams, State as Blake2bState};
use thiserror::Error;

use crate::blockchain::header::BlockHeader;

const PERSONALIZATION_PREFIX: &[u8; 8] = b"ZcashPoW";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EquihashError {
    #[error("unsupported Equihash parameters n={n}, k={k}")]
    InvalidParams { n: u32, k: u32 },
    /// Wrong number of indices, or wrong minimal-encoding byte length.
    #[error("solution has length {actual}, expected {expected}")]
    InvalidSolutionSize { expected: usize, actual: usize },
    #[error("duplicate index {index} in solution")]
    DuplicateIndex { index: u32 },
    #[error("index tree incorrectly ordered at level {level}")]
    OutOfOrder { level: u32 },
    #[error("non-zero XOR at level {level}")]
    NonzeroXor { level: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EquihashParams {
    n: u32,
    k: u32,
}

impl EquihashParams {
    pub fn new(n: u32, k: u32) -> Result<Self, EquihashError> {
        let invalid = EquihashError::InvalidParams { n, k };
        if k == 0 || k >= n || n % 8 != 0 || n > 512 || n % (k + 1) != 0 || k > 16 {
            return Err(invalid);
        }
        let digit_bits = n / (k + 1);
        // Minimal encoding packs digit_bits + 1 bits per index into a u32 lane.
        if !(7..=24).contains(&digit_bits) {
            return Err(invalid);
        }
        if ((1usize << k) * (digit_bits as usize + 1)) % 8 != 0 {
            return Err(invalid);
        }
        Ok(EquihashParams { n, k })
    }

    pub fn n(&self) -> u32 {
        self.n
    }

    pub fn k(&self) -> u32 {
        self.k
    }

    /// Bits cleared per tree level (the "collision length").
    pub fn digit_bits(&self) -> u32 {
        self.n / (self.k + 1)
    }

    /// Number of indices in a solution.
    pub fn proof_size(&self) -> usize {
        1usize << self.k
    }

    /// Byte length of one leaf hash.
    pub fn hash_len(&self) -> usize {
        (self.n / 8) as usize
    }

    pub fn indices_per_hash_output(&self) -> u32 {
        512 / self.n
    }

    pub fn hash_output_len(&self) -> usize {
        self.indices_per_hash_output() as usize * self.hash_len()
    }

    /// Byte length of a minimally encoded solution.
    pub fn solution_size(&self) -> usize {
        self.proof_size() * (self.digit_bits() as usize + 1) / 8
    }

    /// BLAKE2b personalization: "ZcashPoW" || le32(N) || le32(K).
    pub fn personalization(&self) -> [u8; 16] {
        let mut personal = [0u8; 16];
        personal[..8].copy_from_slice(PERSONALIZATION_PREFIX);
        personal[8..12].copy_from_slice(&self.n.to_le_bytes());
        personal[12..].copy_from_slice(&self.k.to_le_bytes());
        personal
    }
}

/// Verifier bound to one header input `I` and nonce `V`.
#[derive(Clone)]
pub struct EquihashVerifier {
    params: EquihashParams,
    base_state: Blake2bState,
}

impl std::fmt::Debug for EquihashVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EquihashVerifier")
            .field("params", &self.params)
            .field("base_state", &"Blake2bState")
            .finish()
    }
}

impl EquihashVerifier {
    pub fn new(params: EquihashParams, input: &[u8], nonce: &[u8]) -> Self {
        let mut base_state = Blake2bParams::new()
            .hash_length(params.hash_output_len())
            .personal(&params.personalization())
            .to_state();
        base_state.update(input);
        base_state.update(nonce);
        EquihashVerifier { params, base_state }
    }

    pub fn params(&self) -> EquihashParams {
        self.params
    }

    /// Leaf hash for `index`: one `N/8`-byte slice of the BLAKE2b output
    /// over `I || V || le32(index / indices_per_hash_output)`.
    pub fn leaf_hash(&self, index: u32) -> Vec<u8> {
        let per_output = self.params.indices_per_hash_output();
        let mut state = self.base_state.clone();
        state.update(&(index / per_output).to_le_bytes());
        let digest = state.finalize();
        let hash_len = self.params.hash_len();
        let start = (index % per_output) as usize * hash_len;
        digest.as_bytes()[start..start + hash_len].to_vec()
    }

    pub fn verify_indices(&self, indices: &[u32]) -> Result<(), EquihashError> {
        let expected = self.params.proof_size();
        if indices.len() != expected {
            return Err(EquihashError::InvalidSolutionSize { expected, actual: indices.len() });
        }

        let mut sorted = indices.to_vec();
        sorted.sort_unstable();
        if let Some(pair) = sorted.windows(2).find(|pair| pair[0] == pair[1]) {
            return Err(EquihashError::DuplicateIndex { index: pair[0] });
        }

        self.verify_level(indices, self.params.k).map(|_| ())
    }

    pub fn verify_minimal(&self, solution: &[u8]) -> Result<(), EquihashError> {
        let indices = indices_from_minimal(&self.params, solution)?;
        self.verify_indices(&indices)
    }

    // Recursion depth is bounded by K.
    fn verify_level(&self, indices: &[u32], level: u32) -> Result<Vec<u8>, EquihashError> {
        if level == 0 {
            return Ok(self.leaf_hash(indices[0]));
        }

        let (left, right) = indices.split_at(1usize << (level - 1));
        if left[0] >= right[0] {
            return Err(EquihashError::OutOfOrder { level });
        }

        let mut hash = self.verify_level(left, level - 1)?;
        let right_hash = self.verify_level(right, level - 1)?;
        for (byte, other) in hash.iter_mut().zip(right_hash.iter()) {
            *byte ^= other;
        }

        if !leading_bits_zero(&hash, (level * self.params.digit_bits()) as usize) {
            return Err(EquihashError::NonzeroXor { level });
        }
        Ok(hash)
    }
}

/// Checks the header's minimally encoded solution against its own input and nonce.
pub fn verify_header(params: &EquihashParams, header: &BlockHeader) -> Result<(), EquihashError> {
    EquihashVerifier::new(*params, &header.equihash_input(), &header.nonce).verify_minimal(&header.solution)
}

fn leading_bits_zero(bytes: &[u8], bits: usize) -> bool {
    let full_bytes = bits / 8;
    if bytes[..full_bytes].iter().any(|&b| b != 0) {
        return false;
    }
    let rem = bits % 8;
    rem == 0 || bytes[full_bytes] >> (8 - rem) == 0
}

/// Unpacks a minimal solution into `2^K` indices of `N/(K+1) + 1` bits each.
pub fn indices_from_minimal(params: &EquihashParams, minimal: &[u8]) -> Result<Vec<u32>, EquihashError> {
    let expected = params.solution_size();
    if minimal.len() != expected {
        return Err(EquihashError::InvalidSolutionSize { expected, actual: minimal.len() });
    }
    let index_bits = params.digit_bits() as usize + 1;
    let byte_pad = 4 - (index_bits + 7) / 8;
    let expanded = expand_array(minimal, params.proof_size() * 4, index_bits, byte_pad);
    Ok(expanded
        .chunks_exact(4)
        .map(|lane| u32::from_be_bytes([lane[0], lane[1], lane[2], lane[3]]))
        .collect())
}

/// Packs indices into the minimal encoding. Indices wider than `N/(K+1) + 1`
/// bits are truncated.
pub fn minimal_from_indices(params: &EquihashParams, indices: &[u32]) -> Vec<u8> {
    let index_bits = params.digit_bits() as usize + 1;
    let byte_pad = 4 - (index_bits + 7) / 8;
    let lanes: Vec<u8> = indices.iter().flat_map(|i| i.to_be_bytes()).collect();
    compress_array(&lanes, index_bits * indices.len() / 8, index_bits, byte_pad)
}

// Splits a big-endian bit string into `bit_len`-bit words, each written
// big-endian into `(bit_len + 7) / 8 + byte_pad` bytes.
fn expand_array(input: &[u8], out_len: usize, bit_len: usize, byte_pad: usize) -> Vec<u8> {
    let out_width = (bit_len + 7) / 8 + byte_pad;
    let bit_len_mask: u64 = (1u64 << bit_len) - 1;
    let mut out = vec![0u8; out_len];

    let mut acc_bits = 0usize;
    let mut acc_value: u64 = 0;
    let mut j = 0usize;
    for &byte in input {
        acc_value = (acc_value << 8) | byte as u64;
        acc_bits += 8;
        if acc_bits >= bit_len {
            acc_bits -= bit_len;
            for x in byte_pad..out_width {
                let shift = 8 * (out_width - x - 1);
                out[j + x] = ((acc_value >> (acc_bits + shift)) & ((bit_len_mask >> shift) & 0xff)) as u8;
            }
            j += out_width;
        }
    }
    out
}

fn compress_array(input: &[u8], out_len: usize, bit_len: usize, byte_pad: usize) -> Vec<u8> {
    let in_width = (bit_len + 7) / 8 + byte_pad;
    let bit_len_mask: u64 = (1u64 << bit_len) - 1;
    let mut out = vec![0u8; out_len];

    let mut acc_bits = 0usize;
    let mut acc_value: u64 = 0;
    let mut j = 0usize;
    for slot in out.iter_mut() {
        if acc_bits < 8 {
            acc_value <<= bit_len;
            for x in byte_pad..in_width {
                let shift = 8 * (in_width - x - 1);
                acc_value |= ((input[j + x] as u64) & ((bit_len_mask >> shift) & 0xff)) << shift;
            }
            j += in_width;
            acc_bits += bit_len;
        }
        acc_bits -= 8;
        *slot = ((acc_value >> acc_bits) & 0xff) as u8;
    }
    out
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::chainparams::REGTEST_PARAMS;
    use std::collections::HashMap;

    /// Wagner's algorithm for small parameters: collide one digit per round,
    /// the last two digits together in the final round. Returns every
    /// candidate found, in canonical order.
    pub(crate) fn solve(verifier: &EquihashVerifier) -> Vec<Vec<u32>> {
        let params = verifier.params();
        let digit = params.digit_bits() as usize;
        let k = params.k() as usize;
        let mut rows: Vec<(Vec<u8>, Vec<u32>)> =
            (0..1u32 << (digit + 1)).map(|i| (verifier.leaf_hash(i), vec![i])).collect();

        for round in 1..=k {
            let width = if round == k { 2 * digit } else { digit };
            let mut buckets: HashMap<u64, Vec<usize>> = HashMap::new();
            for (i, (hash, _)) in rows.iter().enumerate() {
                buckets.entry(read_bits(hash, (round - 1) * digit, width)).or_default().push(i);
            }

            let mut next = Vec::new();
            for members in buckets.values() {
                for (pos, &a) in members.iter().enumerate() {
                    for &b in &members[pos + 1..] {
                        let ((hash_a, idx_a), (hash_b, idx_b)) = (&rows[a], &rows[b]);
                        if idx_a.iter().any(|i| idx_b.contains(i)) {
                            continue;
                        }
                        let hash = hash_a.iter().zip(hash_b).map(|(x, y)| x ^ y).collect();
                        let indices =
                            if idx_a[0] < idx_b[0] { [&idx_a[..], &idx_b[..]].concat() } else { [&idx_b[..], &idx_a[..]].concat() };
                        next.push((hash, indices));
                    }
                }
            }
            rows = next;
        }
        rows.into_iter().map(|(_, indices)| indices).collect()
    }

    fn read_bits(bytes: &[u8], start: usize, len: usize) -> u64 {
        (start..start + len).fold(0, |acc, bit| (acc << 1) | ((bytes[bit / 8] >> (7 - bit % 8)) & 1) as u64)
    }

    /// Regtest genesis (N=48, K=5): its verifier and decoded indices.
    fn genesis_case() -> (EquihashVerifier, Vec<u32>) {
        let header = REGTEST_PARAMS.genesis_header();
        let params = REGTEST_PARAMS.equihash_params();
        let indices = indices_from_minimal(&params, &header.solution).unwrap();
        (EquihashVerifier::new(params, &header.equihash_input(), &header.nonce), indices)
    }

    #[test]
    fn parameter_derivations() {
        let mainnet = EquihashParams::new(200, 9).unwrap();
        assert_eq!(mainnet.digit_bits(), 20);
        assert_eq!(mainnet.proof_size(), 512);
        assert_eq!(mainnet.solution_size(), 1344);
        assert_eq!(mainnet.hash_len(), 25);
        assert_eq!(mainnet.hash_output_len(), 50);

        let small = EquihashParams::new(48, 5).unwrap();
        assert_eq!(small.solution_size(), 36);
        assert_eq!(&small.personalization()[..8], b"ZcashPoW");
        assert_eq!(&small.personalization()[8..12], &48u32.to_le_bytes());
    }

    #[test]
    fn rejects_unusable_parameters() {
        assert!(EquihashParams::new(200, 0).is_err());
        assert!(EquihashParams::new(100, 9).is_err()); // n not a multiple of 8
        assert!(EquihashParams::new(96, 4).is_err()); // n not a multiple of k+1
        assert!(EquihashParams::new(48, 11).is_err());
    }

    #[test]
    fn accepts_genesis_solution() {
        let (verifier, indices) = genesis_case();
        assert_eq!(indices.len(), 32);
        assert_eq!(verifier.verify_indices(&indices), Ok(()));
        let header = REGTEST_PARAMS.genesis_header();
        assert_eq!(verifier.verify_minimal(&header.solution), Ok(()));
        assert_eq!(verify_header(&REGTEST_PARAMS.equihash_params(), &header), Ok(()));
    }

    #[test]
    fn swapped_top_level_halves_are_out_of_order() {
        let (verifier, indices) = genesis_case();
        assert_eq!(verifier.verify_indices(&indices), Ok(()));
        let mut swapped = indices.clone();
        swapped.rotate_left(16);
        assert_eq!(verifier.verify_indices(&swapped), Err(EquihashError::OutOfOrder { level: 5 }));
    }

    #[test]
    fn reversed_leaf_pair_is_out_of_order() {
        let (verifier, indices) = genesis_case();
        let mut reversed = indices.clone();
        reversed.swap(0, 1);
        assert!(matches!(verifier.verify_indices(&reversed), Err(EquihashError::OutOfOrder { .. })));
    }

    #[test]
    fn duplicated_index_is_rejected_before_tree_checks() {
        let (verifier, indices) = genesis_case();
        let mut duplicated = indices.clone();
        duplicated[17] = duplicated[3];
        assert_eq!(verifier.verify_indices(&duplicated), Err(EquihashError::DuplicateIndex { index: indices[3] }));
    }

    #[test]
    fn flipped_input_bit_breaks_collisions() {
        let header = REGTEST_PARAMS.genesis_header();
        let params = REGTEST_PARAMS.equihash_params();
        let (verifier, indices) = genesis_case();
        assert_eq!(verifier.verify_indices(&indices), Ok(()));

        let mut input = header.equihash_input();
        input[0] ^= 0x01;
        let tampered = EquihashVerifier::new(params, &input, &header.nonce);
        assert!(matches!(tampered.verify_indices(&indices), Err(EquihashError::NonzeroXor { .. })));
    }

    #[test]
    fn changed_index_is_rejected() {
        let (verifier, indices) = genesis_case();
        let mut changed = indices.clone();
        changed[0] ^= 1;
        assert!(verifier.verify_indices(&changed).is_err());
    }

    #[test]
    fn wrong_index_count_is_rejected() {
        let (verifier, indices) = genesis_case();
        assert_eq!(
            verifier.verify_indices(&indices[..16]),
            Err(EquihashError::InvalidSolutionSize { expected: 32, actual: 16 })
        );
    }

    #[test]
    fn minimal_encoding_matches_index_form() {
        let header = REGTEST_PARAMS.genesis_header();
        let params = REGTEST_PARAMS.equihash_params();
        let (verifier, indices) = genesis_case();
        let minimal = minimal_from_indices(&params, &indices);
        assert_eq!(minimal, header.solution);
        assert!(matches!(verifier.verify_minimal(&minimal[1..]), Err(EquihashError::InvalidSolutionSize { .. })));
    }

    #[test]
    fn solver_output_verifies() {
        let params = EquihashParams::new(48, 5).unwrap();
        let input = b"Equihash is an asymmetric PoW based on the Generalised Birthday problem.";
        let mut found = 0;
        for nonce in 0u8..8 {
            let verifier = EquihashVerifier::new(params, input, &[nonce; 32]);
            for indices in solve(&verifier) {
                assert_eq!(verifier.verify_indices(&indices), Ok(()));
                assert_eq!(verifier.verify_minimal(&minimal_from_indices(&params, &indices)), Ok(()));
                found += 1;
            }
        }
        assert!(found > 0);
    }

    #[test]
    fn leading_bit_mask() {
        assert!(leading_bits_zero(&[0x00, 0x0f], 12));
        assert!(!leading_bits_zero(&[0x00, 0x1f], 12));
        assert!(leading_bits_zero(&[0x00, 0xff], 8));
        assert!(!leading_bits_zero(&[0x01, 0x00], 8));
    }
}
