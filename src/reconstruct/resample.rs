//! Rate regularization for recorded trials.
//!
//! Hardware never delivers exactly its nominal rate, so recorded trials are
//! rebuilt into exact one-second blocks of `rate` rows each. Blocks are cut
//! on wall-clock timestamps anchored at the trial's first row; a long block
//! is truncated, a short one padded by repeating its own tail until full.
//! This is sample repetition, not interpolation: downstream windowing counts
//! on the row arithmetic, not on spectral purity.

use std::mem;

/// Regularizes `data` (rows of channel values) to exactly `rate` rows per
/// elapsed second of `times`.
///
/// The trailing partial block is kept, pad-only, when it is more than half
/// full; otherwise it is dropped entirely. A timestamp gap produces one block
/// flush per subsequent row, never a burst of empty blocks.
pub fn resample(data: &[Vec<f32>], times: &[f64], rate: usize) -> Vec<Vec<f32>> {
    if data.is_empty() || times.is_empty() || rate == 0 {
        return Vec::new();
    }

    let start = times[0];
    let mut output = Vec::new();
    let mut block: Vec<Vec<f32>> = Vec::new();
    let mut blocks_emitted: u64 = 0;
    let mut block_start = start;

    for (row, &t) in data.iter().zip(times) {
        if t - block_start > 1.0 {
            output.extend(normalize_block(mem::take(&mut block), rate));
            blocks_emitted += 1;
            block_start = start + blocks_emitted as f64;
        }
        block.push(row.clone());
    }

    // Keep the tail only when strictly more than half a block survived.
    if block.len() * 2 > rate {
        pad_with_own_tail(&mut block, rate);
        output.extend(block);
    }
    output
}

fn normalize_block(mut block: Vec<Vec<f32>>, rate: usize) -> Vec<Vec<f32>> {
    if block.len() > rate {
        block.truncate(rate);
    } else {
        pad_with_own_tail(&mut block, rate);
    }
    block
}

/// Repeats the block's trailing rows until it reaches `rate` rows. When more
/// rows are missing than exist, the whole block repeats and the pad wraps.
fn pad_with_own_tail(block: &mut Vec<Vec<f32>>, rate: usize) {
    if block.is_empty() {
        return;
    }
    while block.len() < rate {
        let take = (rate - block.len()).min(block.len());
        let tail: Vec<Vec<f32>> = block[block.len() - take..].to_vec();
        block.extend(tail);
    }
}
