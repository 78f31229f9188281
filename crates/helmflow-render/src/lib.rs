//! マニフェストテンプレートの展開
//!
//! Teraを使用してテンプレートツリーをKubernetesマニフェストに展開します。
//! 展開は二段階で行われます。まずTeraで `data` / `secret` 名前空間の変数を
//! 補間し、次に結果をYAMLとして検証します。どちらかの段階で失敗した場合、
//! セット全体が破棄されます（部分的なマニフェストセットは生成されません）。

pub mod error;
pub mod render;
pub mod tree;

pub use error::{RenderError, Result};
pub use render::{materialize, ManifestRenderer, ManifestSet, Rendered, TemplateData};
pub use tree::{NodePayload, TemplateNode, TemplateTree};
