use anyhow::Result;
use std::path::{Path, PathBuf};

const APP_DIR: &str = "study-aid";

pub fn get_app_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|dir| dir.join(APP_DIR))
        .unwrap_or_else(|| {
            let mut path = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
            path.push(".local/share");
            path.push(APP_DIR);
            path
        })
}

pub fn get_database_path(data_dir: &Path) -> PathBuf {
    let mut path = data_dir.to_path_buf();
    path.push("study-aid.db");
    path
}

pub fn get_storage_dir(data_dir: &Path) -> PathBuf {
    let mut path = data_dir.to_path_buf();
    path.push("storage");
    path
}

/// 初始化日志：`[时间 级别 目标] 消息` 输出到 stderr
pub fn setup_logging(level: log::LevelFilter) -> Result<()> {
    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{} {} {}] {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                record.level(),
                record.target(),
                message
            ))
        })
        .level(level)
        .level_for("hyper", log::LevelFilter::Warn)
        .level_for("reqwest", log::LevelFilter::Warn)
        .chain(std::io::stderr())
        .apply()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_under_data_dir() {
        let dir = Path::new("/var/lib/study");
        assert_eq!(get_database_path(dir), PathBuf::from("/var/lib/study/study-aid.db"));
        assert_eq!(get_storage_dir(dir), PathBuf::from("/var/lib/study/storage"));
        assert!(get_app_data_dir().ends_with(APP_DIR));
    }
}
