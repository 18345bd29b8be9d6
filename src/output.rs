use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc::UnboundedReceiver;

use crate::error::SetupError;
use crate::model::ResolveResult;

/// 结果输出：终端显示 + 可选的结果文件
pub struct ResultSink {
    silent: bool,
    width: usize,
    display: Box<dyn Write + Send>,
    file: Option<(PathBuf, File)>,
    collected: Vec<ResolveResult>,
}

impl ResultSink {
    /// 结果文件以追加方式打开，不存在则创建
    pub fn new(output: Option<&Path>, silent: bool, width: usize) -> Result<Self, SetupError> {
        let file = match output {
            Some(path) => {
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .map_err(|source| SetupError::Output {
                        path: path.display().to_string(),
                        source,
                    })?;
                Some((path.to_path_buf(), file))
            }
            None => None,
        };
        Ok(ResultSink {
            silent,
            width: if silent { 0 } else { width },
            display: Box::new(io::stdout()),
            file,
            collected: Vec::new(),
        })
    }

    /// 替换终端输出目标
    pub fn with_display(mut self, display: Box<dyn Write + Send>) -> Self {
        self.display = display;
        self
    }

    /// 交互模式下用 `\r` 覆盖状态栏，并用空格补齐到终端宽度
    pub fn format_line(&self, result: &ResolveResult) -> String {
        let msg = result.to_string();
        if self.silent {
            return msg;
        }
        let pad = self.width.saturating_sub(msg.len() + 1);
        format!("\r{}{}", msg, " ".repeat(pad))
    }

    pub fn write(&mut self, result: ResolveResult) {
        let line = self.format_line(&result);
        if let Err(e) = writeln!(self.display, "{}", line).and_then(|_| self.display.flush()) {
            log::error!("输出结果失败: {}", e);
        }
        if let Some((path, file)) = self.file.as_mut() {
            let res = writeln!(file, "{}", result.subdomain).and_then(|_| file.flush());
            if let Err(e) = res {
                log::error!("写入结果文件 {} 失败: {}", path.display(), e);
            }
        }
        self.collected.push(result);
    }

    /// 按到达顺序写出结果，通道关闭后返回全部结果
    pub async fn sink_cycle(mut self, mut results: UnboundedReceiver<ResolveResult>) -> Vec<ResolveResult> {
        while let Some(result) = results.recv().await {
            self.write(result);
        }
        self.collected
    }
}

/// 从结果文件中删除指定域名，其余行（包括之前运行追加的）原样保留，返回删除的行数
pub fn remove_from_output(path: &Path, names: &[&str]) -> io::Result<usize> {
    if names.is_empty() {
        return Ok(0);
    }
    let names: HashSet<&str> = names.iter().copied().collect();
    let content = fs::read_to_string(path)?;

    let mut kept = String::with_capacity(content.len());
    let mut removed = 0;
    for line in content.lines() {
        if names.contains(line.trim()) {
            removed += 1;
            continue;
        }
        kept.push_str(line);
        kept.push('\n');
    }
    fs::write(path, kept)?;
    Ok(removed)
}

/// CSV转义
fn escape_csv(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

/// 把结果文件转换为 `<output>.csv`，每行一个域名
pub fn export_csv(output: &Path) -> Result<PathBuf, SetupError> {
    let content = fs::read_to_string(output).map_err(|source| SetupError::Input {
        path: output.display().to_string(),
        source,
    })?;

    let mut csv = String::from("Domain\n");
    for line in content.lines().map(str::trim).filter(|l| !l.is_empty()) {
        csv.push_str(&escape_csv(line));
        csv.push('\n');
    }

    let mut target = output.as_os_str().to_os_string();
    target.push(".csv");
    let target = PathBuf::from(target);
    fs::write(&target, csv).map_err(|source| SetupError::Output {
        path: target.display().to_string(),
        source,
    })?;
    Ok(target)
}
