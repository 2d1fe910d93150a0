//! Transpose bit-matrices.
//!
//! The matrix is stored row-major with each row packed into bytes, bit `j` of
//! a row lives in bit `j % 8` of byte `j / 8`. The transpose works on 8x8 bit
//! tiles packed into a single `u64`.

/// Transpose a bit matrix.
///
/// # Panics
/// If `rows % 128 != 0`
/// If for `let cols = input.len() * 8 / rows`, `cols % 128 != 0`
/// If `input.len() != output.len()`
pub fn transpose_bitmatrix(input: &[u8], output: &mut [u8], rows: usize) {
    assert_eq!(input.len(), output.len());
    assert_eq!(0, rows % 128, "rows must be a multiple of 128");
    let cols = input.len() * 8 / rows;
    assert_eq!(0, cols % 128, "columns must be a multiple of 128");

    let row_bytes = cols / 8;
    let out_row_bytes = rows / 8;

    for rb in (0..rows).step_by(8) {
        for cb in 0..row_bytes {
            let mut tile = [0_u8; 8];
            for (i, byte) in tile.iter_mut().enumerate() {
                *byte = input[(rb + i) * row_bytes + cb];
            }
            let tile = transpose_8x8(u64::from_le_bytes(tile)).to_le_bytes();
            for (i, byte) in tile.into_iter().enumerate() {
                output[(cb * 8 + i) * out_row_bytes + rb / 8] = byte;
            }
        }
    }
}

// Byte `i` of `x` is row `i` of the tile, bit `j` of that byte is column `j`.
#[inline]
fn transpose_8x8(mut x: u64) -> u64 {
    let t = (x ^ (x >> 7)) & 0x00AA_00AA_00AA_00AA;
    x ^= t ^ (t << 7);
    let t = (x ^ (x >> 14)) & 0x0000_CCCC_0000_CCCC;
    x ^= t ^ (t << 14);
    let t = (x ^ (x >> 28)) & 0x0000_0000_F0F0_F0F0;
    x ^= t ^ (t << 28);
    x
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::{transpose_8x8, transpose_bitmatrix};

    fn get_bit(m: &[u8], row_bytes: usize, row: usize, col: usize) -> bool {
        (m[row * row_bytes + col / 8] >> (col % 8)) & 1 == 1
    }

    #[test]
    fn tile_transpose() {
        // row 0 = 0b0000_0010 means entry (0, 1) is set
        let x = u64::from_le_bytes([0b10, 0, 0, 0, 0, 0, 0, 0]);
        let t = transpose_8x8(x).to_le_bytes();
        assert_eq!([0, 0b1, 0, 0, 0, 0, 0, 0], t);
    }

    #[test]
    fn single_bit_moves() {
        let rows = 128;
        let cols = 256;
        let mut input = vec![0_u8; rows * cols / 8];
        // entry (3, 200)
        input[3 * (cols / 8) + 200 / 8] |= 1 << (200 % 8);
        let mut output = vec![0_u8; input.len()];
        transpose_bitmatrix(&input, &mut output, rows);
        assert!(get_bit(&output, rows / 8, 200, 3));
        assert_eq!(1, output.iter().map(|b| b.count_ones()).sum::<u32>());
    }

    proptest! {
        #[test]
        fn double_transpose_is_identity(
            (rows, cols, input) in (1_usize..4, 1_usize..4).prop_flat_map(|(r, c)| {
                let (rows, cols) = (r * 128, c * 128);
                (Just(rows), Just(cols), prop::collection::vec(any::<u8>(), rows * cols / 8))
            })
        ) {
            let mut transposed = vec![0_u8; input.len()];
            transpose_bitmatrix(&input, &mut transposed, rows);
            for (row, col) in [(0, 0), (rows - 1, cols - 1), (rows / 2, cols / 3)] {
                prop_assert_eq!(
                    get_bit(&input, cols / 8, row, col),
                    get_bit(&transposed, rows / 8, col, row)
                );
            }
            let mut back = vec![0_u8; input.len()];
            transpose_bitmatrix(&transposed, &mut back, cols);
            prop_assert_eq!(input, back);
        }
    }
}
