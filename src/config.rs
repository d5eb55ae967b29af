//! Loading quiz configuration (prompts, generation knobs, storage paths) from TOML.
//!
//! See `QuizConfig` for the expected schema. Every field has a default, so an
//! empty or missing file yields the stock configuration.

use serde::Deserialize;
use tracing::{error, info};

#[derive(Clone, Debug, Deserialize, Default)]
pub struct QuizConfig {
  #[serde(default)]
  pub prompts: Prompts,
  #[serde(default)]
  pub generation: GenerationCfg,
  #[serde(default)]
  pub storage: StorageCfg,
}

/// Prompts sent to the question generator. `{subject}` and `{count}` are
/// substituted before sending.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Prompts {
  pub system: String,
  pub user_template: String,
}

impl Default for Prompts {
  fn default() -> Self {
    Self {
      system: "Bạn là một giáo viên bồi dưỡng học sinh giỏi tiểu học tại Việt Nam. Chỉ trả lời bằng JSON đúng schema.".into(),
      user_template: r#"Hãy tạo một đề thi trắc nghiệm môn {subject} trình độ NÂNG CAO cho học sinh Lớp 2.

Yêu cầu chung:
1. Số lượng: {count} câu hỏi.
2. Độ khó: KHÁ - GIỎI. Tránh các phép cộng trừ quá đơn giản.
3. Mỗi câu hỏi có đúng 4 lựa chọn; correctAnswerIndex là 0, 1, 2 hoặc 3.
4. Trả về một mảng JSON theo schema đã cung cấp.

Hình minh họa (svgImage):
- Khoảng 40-50% số câu có hình SVG đơn giản, màu tươi sáng, bắt đầu bằng <svg.
- Ưu tiên bài tư duy hình ảnh: đếm hình, cân thăng bằng, quy luật hình vẽ, xem đồng hồ.
- Câu không cần hình thì để trống.

Môn Toán: dãy số quy luật, bài toán trồng cây và xếp hàng, bài toán có lời văn hai bước,
đếm hình chồng nhau, khoảng thời gian và đổi đơn vị đo, tìm x, tính nhanh.

Môn Tiếng Việt: câu đố dân gian có hình, đoán chữ, từ đồng nghĩa và trái nghĩa, từ láy,
từ ghép, sắp xếp câu, tìm lỗi sai, dấu câu, từ gợi tả âm thanh và hình ảnh."#.into(),
    }
  }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct GenerationCfg {
  pub question_count: usize,
  pub temperature: f32,
}

impl Default for GenerationCfg {
  fn default() -> Self {
    Self { question_count: 20, temperature: 0.8 }
  }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct StorageCfg {
  pub device_id_path: String,
  pub results_table: String,
}

impl Default for StorageCfg {
  fn default() -> Self {
    Self { device_id_path: "./data/device_id".into(), results_table: "quiz_results".into() }
  }
}

/// Parse a TOML document into `QuizConfig`.
pub fn parse_config(s: &str) -> Result<QuizConfig, toml::de::Error> {
  toml::from_str::<QuizConfig>(s)
}

/// Load `QuizConfig` from QUIZ_CONFIG_PATH. On any parsing/IO error, returns defaults.
/// DEVICE_ID_PATH, when set, overrides `storage.device_id_path`.
pub fn load_config_from_env() -> QuizConfig {
  let mut cfg = match std::env::var("QUIZ_CONFIG_PATH") {
    Ok(path) => match std::fs::read_to_string(&path) {
      Ok(s) => match parse_config(&s) {
        Ok(cfg) => {
          info!(target: "bevuihoc_backend", %path, "Loaded quiz config (TOML)");
          cfg
        }
        Err(e) => {
          error!(target: "bevuihoc_backend", %path, error = %e, "Failed to parse TOML config; using defaults");
          QuizConfig::default()
        }
      },
      Err(e) => {
        error!(target: "bevuihoc_backend", %path, error = %e, "Failed to read TOML config file; using defaults");
        QuizConfig::default()
      }
    },
    Err(_) => QuizConfig::default(),
  };

  if let Ok(p) = std::env::var("DEVICE_ID_PATH") {
    if !p.trim().is_empty() {
      cfg.storage.device_id_path = p;
    }
  }
  cfg
}
