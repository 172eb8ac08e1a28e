//! Mixing and resampling for flush windows.
//!
//! Both operate on one flush window at a time. The resampler carries its
//! phase and last input sample across windows so consecutive chunks join
//! without clicks.

/// Mix mono windows into one, averaging wherever more than one source has
/// audio. A source that delivered fewer samples this window only contributes
/// to the indices it covers.
pub fn mix(sources: &[&[f32]]) -> Vec<f32> {
    let max_len = sources.iter().map(|s| s.len()).max().unwrap_or(0);
    if max_len == 0 {
        return Vec::new();
    }

    let mut mixed = Vec::with_capacity(max_len);
    for i in 0..max_len {
        let (sum, contributors) = sources
            .iter()
            .filter_map(|source| source.get(i))
            .fold((0.0f32, 0u32), |(sum, n), &s| (sum + s, n + 1));
        mixed.push(sum / contributors.max(1) as f32);
    }

    // Sources are nominally in [-1.0, 1.0]; guard against hot inputs
    let max_abs = mixed.iter().map(|s| s.abs()).fold(0.0f32, f32::max);
    if max_abs > 1.0 {
        for sample in &mut mixed {
            *sample /= max_abs;
        }
    }

    mixed
}

/// Linear-interpolating resampler that is continuous across windows.
#[derive(Debug, Clone)]
pub struct StreamResampler {
    from_rate: u32,
    to_rate: u32,
    /// Read position relative to `carry` (or to the window start when empty)
    position: f64,
    carry: Option<f32>,
}

impl StreamResampler {
    pub fn new(from_rate: u32, to_rate: u32) -> Self {
        Self {
            from_rate,
            to_rate,
            position: 0.0,
            carry: None,
        }
    }

    pub fn from_rate(&self) -> u32 {
        self.from_rate
    }

    pub fn process(&mut self, window: &[f32]) -> Vec<f32> {
        if self.from_rate == self.to_rate || self.to_rate == 0 {
            return window.to_vec();
        }
        if window.is_empty() {
            return Vec::new();
        }

        let input: Vec<f32> = self.carry.iter().copied().chain(window.iter().copied()).collect();
        let step = self.from_rate as f64 / self.to_rate as f64;
        let last = input.len() - 1;

        let mut output = Vec::with_capacity((window.len() as f64 / step).ceil() as usize + 1);
        let mut position = self.position;
        while position < last as f64 {
            let index = position as usize;
            let frac = (position - index as f64) as f32;
            output.push(input[index] * (1.0 - frac) + input[index + 1] * frac);
            position += step;
        }

        self.position = position - last as f64;
        self.carry = Some(input[last]);
        output
    }
}
