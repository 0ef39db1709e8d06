use serde::{Deserialize, Serialize};

/// Pixel neighbourhood used when growing or comparing regions.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Connexity {
    C4,
    C8,
}

const C4_OFFSETS: [(isize, isize); 4] = [(0, -1), (-1, 0), (1, 0), (0, 1)];
const C8_OFFSETS: [(isize, isize); 8] = [
    (-1, -1),
    (0, -1),
    (1, -1),
    (-1, 0),
    (1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];

/* half of each neighbourhood: every unordered pixel pair is visited once in a scan */
const C4_FORWARD: [(isize, isize); 2] = [(1, 0), (0, 1)];
const C8_FORWARD: [(isize, isize); 4] = [(1, 0), (-1, 1), (0, 1), (1, 1)];

impl Connexity {
    pub fn offsets(self) -> &'static [(isize, isize)] {
        match self {
            Connexity::C4 => &C4_OFFSETS,
            Connexity::C8 => &C8_OFFSETS,
        }
    }

    pub fn forward_offsets(self) -> &'static [(isize, isize)] {
        match self {
            Connexity::C4 => &C4_FORWARD,
            Connexity::C8 => &C8_FORWARD,
        }
    }
}

/// Dense row-major grid.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid<T> {
    width: usize,
    height: usize,
    data: Vec<T>,
}

/// `true` where the pixel holds valid data.
pub type ValidityMask = Grid<bool>;
/// Region id per pixel, `0` is background.
pub type LabelGrid = Grid<u32>;
/// Fused boundary strength in `[0, 255]`.
pub type EdgeField = Grid<f32>;

impl<T: Clone> Grid<T> {
    pub fn new(width: usize, height: usize, fill: T) -> Grid<T> {
        Grid {
            width,
            height,
            data: vec![fill; width * height],
        }
    }
}

impl<T> Grid<T> {
    /// Wraps `data`, returning `None` when its length is not `width * height`.
    pub fn from_vec(width: usize, height: usize, data: Vec<T>) -> Option<Grid<T>> {
        if data.len() != width * height {
            return None;
        }
        Some(Grid {
            width,
            height,
            data,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn same_shape<U>(&self, other: &Grid<U>) -> bool {
        self.width == other.width && self.height == other.height
    }

    #[inline]
    pub fn index(&self, x: usize, y: usize) -> usize {
        y * self.width + x
    }

    #[inline]
    pub fn coord(&self, index: usize) -> (usize, usize) {
        (index % self.width, index / self.width)
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> &T {
        &self.data[y * self.width + x]
    }

    #[inline]
    pub fn get_mut(&mut self, x: usize, y: usize) -> &mut T {
        &mut self.data[y * self.width + x]
    }

    /// Index of `(x + dx, y + dy)` if it lies inside the grid.
    #[inline]
    pub fn offset(&self, x: usize, y: usize, dx: isize, dy: isize) -> Option<usize> {
        let nx = x as isize + dx;
        let ny = y as isize + dy;
        if nx < 0 || ny < 0 || nx >= self.width as isize || ny >= self.height as isize {
            return None;
        }
        Some(ny as usize * self.width + nx as usize)
    }

    pub fn neighbors(&self, index: usize, connexity: Connexity) -> impl Iterator<Item = usize> + '_ {
        let (x, y) = self.coord(index);
        connexity
            .offsets()
            .iter()
            .filter_map(move |&(dx, dy)| self.offset(x, y, dx, dy))
    }

    pub fn data(&self) -> &[T] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [T] {
        &mut self.data
    }

    pub fn into_vec(self) -> Vec<T> {
        self.data
    }

    pub fn map<U, F: FnMut(&T) -> U>(&self, f: F) -> Grid<U> {
        Grid {
            width: self.width,
            height: self.height,
            data: self.data.iter().map(f).collect(),
        }
    }
}

impl ValidityMask {
    pub fn count_valid(&self) -> usize {
        self.data.iter().filter(|v| **v).count()
    }

    pub fn and_assign(&mut self, other: &ValidityMask) {
        for (a, b) in self.data.iter_mut().zip(other.data.iter()) {
            *a = *a && *b;
        }
    }
}
