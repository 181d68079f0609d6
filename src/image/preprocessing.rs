use crate::utils::error::DiagnosisError;
use crate::Result;
use image::{imageops::FilterType, DynamicImage};
use ndarray::{Array4, ArrayView4};

/// 模型默认输入边长
pub const DEFAULT_INPUT_SIZE: u32 = 224;

/// RGB 通道数
pub const CHANNELS: usize = 3;

/// 模型输入张量，NHWC 布局 `(1, H, W, 3)`，取值范围 [0, 1]
#[derive(Debug, Clone, PartialEq)]
pub struct ImageTensor(Array4<f32>);

impl ImageTensor {
    pub fn new(array: Array4<f32>) -> Result<Self> {
        let shape = array.shape();
        if shape[0] != 1 || shape[3] != CHANNELS || shape[1] == 0 || shape[2] == 0 {
            return Err(DiagnosisError::ImageProcessing(format!(
                "Expected tensor shape (1, H, W, {}), got {:?}",
                CHANNELS, shape
            )));
        }
        if array.iter().any(|v| !(0.0..=1.0).contains(v)) {
            return Err(DiagnosisError::ImageProcessing(
                "Tensor values must lie in [0, 1]".to_string(),
            ));
        }
        Ok(Self(array))
    }

    pub fn shape(&self) -> &[usize] {
        self.0.shape()
    }

    pub fn view(&self) -> ArrayView4<'_, f32> {
        self.0.view()
    }
}

/// 分类模型的图像预处理：拉伸缩放 + 归一化 + batch 维度
#[derive(Debug, Clone, Copy)]
pub struct ImagePreprocessor {
    target_size: u32,
    filter: FilterType,
}

impl Default for ImagePreprocessor {
    fn default() -> Self {
        Self::new(DEFAULT_INPUT_SIZE)
    }
}

impl ImagePreprocessor {
    pub fn new(target_size: u32) -> Self {
        Self {
            target_size: target_size.max(1),
            filter: FilterType::CatmullRom,
        }
    }

    /// 缩放到 target×target（不保持宽高比），转 RGB，除以 255，加 batch 维度
    pub fn preprocess(&self, image: &DynamicImage) -> Result<ImageTensor> {
        let size = self.target_size;
        let resized = image.resize_exact(size, size, self.filter);
        let rgb = resized.to_rgb8();

        let side = size as usize;
        let array = Array4::from_shape_fn((1, side, side, CHANNELS), |(_, y, x, c)| {
            rgb.get_pixel(x as u32, y as u32)[c] as f32 / 255.0
        });

        ImageTensor::new(array)
    }
}
