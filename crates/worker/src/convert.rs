use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use tracing::info;

/// UNL格式的字段分隔符
const UNL_FIELD_SEPARATOR: char = '\u{0007}';

/// 把一个 .unl.gz 产物解压转换为同目录下的CSV
///
/// `foo.unl.gz` 生成 `foo.csv`：逐行解压，空行跳过，`\x07` 分隔的
/// 字段改写为逗号分隔。
pub fn unl_gz_to_csv(input: &Path) -> std::io::Result<PathBuf> {
    // 去掉 .gz 和 .unl 两层扩展名
    let output = input.with_extension("").with_extension("csv");

    let reader = BufReader::new(GzDecoder::new(File::open(input)?));
    let mut writer = BufWriter::new(File::create(&output)?);
    for line in reader.lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let row: Vec<&str> = line.split(UNL_FIELD_SEPARATOR).collect();
        writeln!(writer, "{}", row.join(","))?;
    }
    writer.flush()?;
    Ok(output)
}

/// 转换目录中所有 .unl.gz 产物，返回失败信息列表
///
/// 建议性步骤：单个产物转换失败只产生一条错误信息，
/// 不影响其余产物，也不中断后续的行加载。
pub fn convert_unl_artifacts(dir: &Path) -> Vec<String> {
    let mut errors = Vec::new();
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            errors.push(format!("读取产物目录 {} 失败: {e}", dir.display()));
            return errors;
        }
    };

    for path in entries.filter_map(|entry| entry.ok().map(|e| e.path())) {
        let is_unl_gz = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.to_ascii_lowercase().ends_with(".unl.gz"));
        if !is_unl_gz {
            continue;
        }
        match unl_gz_to_csv(&path) {
            Ok(output) => info!(
                "UNL产物已转换: {} -> {}",
                path.display(),
                output.display()
            ),
            Err(e) => errors.push(format!("转换 {} 失败: {e}", path.display())),
        }
    }
    errors
}
