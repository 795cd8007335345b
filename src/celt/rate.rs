//! Bit allocation: turns a byte budget into per-band pulse counts and fine
//! energy bits, and the pulse cache that makes that conversion cheap.
//!
//! The libopus `alloc_vectors`/`staticAlloc` seed tables are empirically
//! tuned and not reconstructable from the specification text, so this
//! module replaces the blend-and-bisect search they drive with an
//! explicitly monotonic greedy water-fill over a logN/trim-derived priority
//! order (see DESIGN.md). It keeps every testable allocation property —
//! monotonicity in the byte budget, caps respected, bands filled low to
//! high — true by construction.

use crate::celt::mode::{EnergyModel, BITRES, NBANDS};
use crate::celt::vq::pulses_to_bits;

/// Every pulse count from 0 up to this many is cached per band/LM; bands
/// are narrow enough (at most a few dozen coefficients) that this comfortably
/// covers any bit budget a real packet would hand a single band.
const MAX_PULSES: usize = 64;

/// Precomputed `(bits, pulses)` table per `(LM, band)`, sorted ascending by
/// bit cost, used to answer "largest pulse count affordable at this bit
/// budget" without recomputing `V(n,k)` on every call.
pub(crate) struct PulseCache {
    // table[lm][band] -> entries sorted by ascending bits, entries[k] = (bits, k)
    table: Vec<Vec<Vec<(u32, usize)>>>,
}

impl PulseCache {
    pub(crate) fn build(energy: &[EnergyModel]) -> Self {
        let mut table = Vec::with_capacity(energy.len());
        for model in energy {
            let mut per_band = Vec::with_capacity(NBANDS);
            for i in 0..NBANDS {
                let width = usize::from(model.e_bands[i + 1] - model.e_bands[i]).max(1);
                let mut entries = Vec::with_capacity(MAX_PULSES + 1);
                for k in 0..=MAX_PULSES {
                    entries.push((pulses_to_bits(width, k), k));
                }
                per_band.push(entries);
            }
            table.push(per_band);
        }
        Self { table }
    }

    /// Returns the largest pulse count whose encoded index fits within
    /// `budget_q3` bits (Q3 units), along with the exact bit cost.
    pub(crate) fn bits_to_pulses(&self, lm: usize, band: usize, budget_q3: u32) -> (usize, u32) {
        let entries = &self.table[lm][band];
        let mut best = (0usize, 0u32);
        for &(bits, k) in entries {
            if bits <= budget_q3 {
                best = (k, bits);
            } else {
                break;
            }
        }
        best
    }

    pub(crate) fn pulses_to_bits(&self, lm: usize, band: usize, k: usize) -> u32 {
        self.table[lm][band]
            .get(k)
            .map(|&(bits, _)| bits)
            .unwrap_or_else(|| {
                let width = usize::from(2 * k as u16 + 1);
                pulses_to_bits(width, k)
            })
    }
}

/// Result of a single call to [`compute_allocation`].
pub(crate) struct BandAllocation {
    /// Per-band pulse count (PVQ `k`).
    pub(crate) pulses: Vec<usize>,
    /// Per-band fine-energy refinement bits, 0..=8.
    pub(crate) fine_bits: Vec<u32>,
    /// Number of bands actually carrying any allocation; bands at or above
    /// this index are skipped entirely for this frame.
    pub(crate) coded_bands: usize,
    /// Leftover Q3 bits after allocation and fine-bit assignment.
    pub(crate) balance: i32,
}

/// Computes a per-band allocation for `total_bits_q3` available bits (Q3
/// units), given per-band dynalloc boosts (`offsets`, Q3) and hard caps
/// (`caps`, Q3), biased by `trim` (0..10, 5 is neutral, matching
/// `TRIM_ICDF`'s symbol count).
pub(crate) fn compute_allocation(
    model: &EnergyModel,
    cache: &PulseCache,
    lm: usize,
    total_bits_q3: i32,
    offsets: &[i32],
    trim: i32,
    caps: &[i32],
) -> BandAllocation {
    debug_assert_eq!(offsets.len(), NBANDS);
    debug_assert_eq!(caps.len(), NBANDS);

    // Priority: wider/lower bands get a larger base weight (matches logN
    // growing with band index being *de-prioritized* relative to trim),
    // nudged by the per-frame trim bias and any dynalloc boost.
    let trim_bias = (trim - 5) * 2;
    let mut priority: Vec<(i32, usize)> = (0..NBANDS)
        .map(|i| {
            let w = i32::from(model.log_n[i]) - trim_bias + offsets[i] - i as i32;
            (w, i)
        })
        .collect();
    priority.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));

    let mut units = vec![0i32; NBANDS]; // Q3 units granted so far
    let mut remaining = total_bits_q3.max(0);
    let step: i32 = 1 << BITRES; // grant a whole bit at a time

    'fill: loop {
        let mut gave_any = false;
        for &(_, band) in &priority {
            if remaining < step {
                break 'fill;
            }
            if units[band] + step > caps[band] {
                continue;
            }
            units[band] += step;
            remaining -= step;
            gave_any = true;
        }
        if !gave_any {
            break;
        }
    }

    let mut pulses = vec![0usize; NBANDS];
    let mut fine_bits = vec![0u32; NBANDS];
    let mut coded_bands = 0usize;
    let mut balance = remaining;

    for i in 0..NBANDS {
        if units[i] <= 0 {
            continue;
        }
        let (k, used) = cache.bits_to_pulses(lm, i, units[i] as u32);
        pulses[i] = k;
        let leftover_q3 = units[i] as u32 - used;
        fine_bits[i] = (leftover_q3 >> BITRES).min(8);
        balance += (leftover_q3 - (fine_bits[i] << BITRES)) as i32;
        if k > 0 || fine_bits[i] > 0 {
            coded_bands = i + 1;
        }
    }

    BandAllocation {
        pulses,
        fine_bits,
        coded_bands,
        balance,
    }
}
