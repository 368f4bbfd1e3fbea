//! 客户端与服务端共用的上传校验规则。

use std::path::{Component, Path};

pub const CSV_EXTENSION: &str = ".csv";
pub const MAX_UPLOAD_SIZE: u64 = 100 * 1024 * 1024;

/// 文件名是否以 `.csv` 结尾（区分大小写）。
pub fn is_csv_name(name: &str) -> bool {
    name.ends_with(CSV_EXTENSION)
}

pub fn within_size_limit(size: u64) -> bool {
    size <= MAX_UPLOAD_SIZE
}

/// 取客户端提交文件名的最后一段，去掉任何目录部分。
pub fn base_file_name(raw: &str) -> Option<&str> {
    let trimmed = raw.trim();
    let last = trimmed.rsplit(['/', '\\']).next()?;
    if is_plain_component(last) {
        Some(last)
    } else {
        None
    }
}

/// 判断名称是否恰好是一个普通路径段。
pub fn is_plain_component(name: &str) -> bool {
    if name.is_empty() || name.contains(['/', '\\', '\0']) {
        return false;
    }
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_suffix_is_case_sensitive() {
        assert!(is_csv_name("sales.csv"));
        assert!(!is_csv_name("sales.CSV"));
        assert!(!is_csv_name("data.txt"));
        assert!(!is_csv_name("sales.csv.exe"));
        assert!(!is_csv_name("salescsv"));
    }

    #[test]
    fn size_limit_is_inclusive() {
        assert!(within_size_limit(MAX_UPLOAD_SIZE));
        assert!(!within_size_limit(MAX_UPLOAD_SIZE + 1));
    }

    #[test]
    fn base_file_name_strips_directories() {
        assert_eq!(base_file_name("reports/sales.csv"), Some("sales.csv"));
        assert_eq!(base_file_name("C:\\tmp\\sales.csv"), Some("sales.csv"));
        assert_eq!(base_file_name("../../etc/passwd.csv"), Some("passwd.csv"));
        assert_eq!(base_file_name("reports/.."), None);
        assert_eq!(base_file_name(""), None);
    }

    #[test]
    fn plain_component_rejects_traversal() {
        assert!(is_plain_component("123-sales.csv"));
        assert!(!is_plain_component(".."));
        assert!(!is_plain_component("."));
        assert!(!is_plain_component("../../etc/passwd"));
        assert!(!is_plain_component("a/b.csv"));
    }
}
