use rand::Rng;

/// Glorot (Xavier) uniform initialization: samples from U(-l, l) with
/// `l = sqrt(6 / (fan_in + fan_out))`.
///
/// For convolution kernels the fans include the receptive field, i.e.
/// `fan_in = k * k * in_channels` and `fan_out = k * k * out_channels`.
pub fn glorot_uniform<R: Rng + ?Sized>(
    len: usize,
    fan_in: usize,
    fan_out: usize,
    rng: &mut R,
) -> Vec<f32> {
    let limit = (6.0 / (fan_in + fan_out) as f32).sqrt();
    (0..len).map(|_| rng.gen_range(-limit..=limit)).collect()
}

/// Derives an independent, reproducible seed for one RNG stream.
///
/// SplitMix64 finaliser over `seed` and the stream id, so neighbouring
/// stream ids give unrelated seeds.
pub fn stream_seed(seed: u64, stream: u64) -> u64 {
    let mut z = seed
        .wrapping_add(0x9E37_79B9_7F4A_7C15)
        .wrapping_add(stream.wrapping_mul(0xBF58_476D_1CE4_E5B9));
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}
