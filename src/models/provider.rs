use crate::diagnosis::ProbabilityVector;
use crate::image::ImageTensor;
use crate::Result;

/// 分类模型：输入预处理后的张量，输出每个类别的概率
pub trait ModelProvider: Send + Sync {
    fn predict(&self, tensor: &ImageTensor) -> Result<ProbabilityVector>;

    /// 模型声明的输出类别数（元数据中未声明时为 None）
    fn num_classes(&self) -> Option<usize>;

    /// 用于日志和 /api/info 的描述
    fn name(&self) -> &str;
}
