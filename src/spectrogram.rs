//! Dense matrices produced by the synthesizer.

/// Row-major `rows × cols` `f32` matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    data: Vec<f32>,
    rows: usize,
    cols: usize,
}

impl Matrix {
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self { data: vec![0.0; rows * cols], rows, cols }
    }

    /// Returns `None` when `data.len() != rows * cols`.
    pub fn from_vec(data: Vec<f32>, rows: usize, cols: usize) -> Option<Self> {
        (data.len() == rows * cols).then_some(Self { data, rows, cols })
    }

    /// Stack per-step columns into a `rows × columns.len()` matrix.
    /// Every column must have length `rows`.
    pub fn from_columns(columns: &[Vec<f32>], rows: usize) -> Option<Self> {
        let cols = columns.len();
        let mut data = vec![0.0; rows * cols];
        for (j, col) in columns.iter().enumerate() {
            if col.len() != rows {
                return None;
            }
            for (i, &v) in col.iter().enumerate() {
                data[i * cols + j] = v;
            }
        }
        Some(Self { data, rows, cols })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<f32> {
        self.data
    }

    pub fn get(&self, row: usize, col: usize) -> Option<f32> {
        (row < self.rows && col < self.cols).then(|| self.data[row * self.cols + col])
    }

    pub fn row(&self, row: usize) -> &[f32] {
        &self.data[row * self.cols..(row + 1) * self.cols]
    }
}

/// `n_mel_channels × frames`.
pub type MelSpectrogram = Matrix;

/// `symbols × frames` attention weights.
pub type AlignmentMatrix = Matrix;

/// Everything the synthesizer produces for one utterance.
#[derive(Debug, Clone, PartialEq)]
pub struct Spectrograms {
    pub mel: MelSpectrogram,
    pub mel_postnet: MelSpectrogram,
    pub alignment: AlignmentMatrix,
    /// The decoder hit its step limit and the output was cut there.
    pub truncated: bool,
}

impl Spectrograms {
    pub fn frames(&self) -> usize {
        self.mel_postnet.cols()
    }
}
