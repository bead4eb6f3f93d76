use candle_core::{DType, Device, Tensor};
use qagent_embed::masked_mean_l2;

#[test]
fn masked_rows_average_only_live_tokens() {
    let dev = Device::Cpu;
    // Row 0 keeps token 0 only; row 1 keeps both tokens.
    let h = Tensor::from_slice(
        &[3.0f32, 4.0, 100.0, 100.0, 1.0, 0.0, 3.0, 0.0],
        (2, 2, 2),
        &dev,
    )
    .unwrap();
    let mask = Tensor::from_slice(&[1u32, 0, 1, 1], (2, 2), &dev).unwrap().to_dtype(DType::F32).unwrap();
    let out: Vec<Vec<f32>> = masked_mean_l2(&h, &mask).unwrap().to_vec2().unwrap();

    let expected = [[0.6f32, 0.8], [1.0, 0.0]];
    for (row, exp) in out.iter().zip(expected.iter()) {
        for (a, b) in row.iter().zip(exp.iter()) {
            assert!((a - b).abs() < 1e-5, "a={a} b={b}");
        }
    }
}

#[test]
fn rejects_non_3d_hidden_states() {
    let dev = Device::Cpu;
    let h = Tensor::zeros((2, 3), DType::F32, &dev).unwrap();
    let mask = Tensor::ones((2, 3), DType::F32, &dev).unwrap();
    assert!(masked_mean_l2(&h, &mask).is_err());
}
