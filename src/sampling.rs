//! Deterministic frame sampling.
//!
//! Every Replay-Mobile video holds exactly [`VIDEO_FRAME_COUNT`] frames. Instead of
//! handing whole videos to the verification layer, a bounded number of frames is
//! picked from each one so that they are spread evenly over the recording.

/// Number of frames guaranteed to exist in every video of the dataset.
pub const VIDEO_FRAME_COUNT: usize = 240;

/// Returns the indices of the frames to sample from a sequence of `total` frames.
///
/// When `desired` is unset, negative, or not smaller than `total`, every index in
/// `0..total` is returned. Otherwise exactly `desired` indices are placed at the
/// centres of `desired` equal-width bins: `floor((i + 0.5) * total / desired)`.
///
/// The placement is fixed and never randomised. Collisions caused by rounding are
/// not corrected.
pub fn selected_indices(total: usize, desired: Option<i64>) -> Vec<usize> {
    let desired = match desired {
        Some(d) if d >= 0 && (d as u64) < total as u64 => d as usize,
        _ => return (0..total).collect(),
    };

    let step = total as f64 / desired as f64;
    (0..desired)
        .map(|i| ((i as f64 + 0.5) * step).floor() as usize)
        .collect()
}
