//! 上传进度：统计已发送字节并换算为百分比。

use futures_util::stream::{Stream, StreamExt};
use tokio::sync::mpsc::UnboundedSender;

pub fn percent(sent: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    ((sent.min(total) as f64 / total as f64) * 100.0).round() as u8
}

/// 包装请求体流，每发出一个分块就上报累计字节数。
pub fn counting<S, B, E>(stream: S, progress: UnboundedSender<u64>) -> impl Stream<Item = Result<B, E>>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
{
    let mut sent: u64 = 0;
    stream.inspect(move |chunk| {
        if let Ok(bytes) = chunk {
            sent += bytes.as_ref().len() as u64;
            let _ = progress.send(sent);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;
    use tokio::sync::mpsc;

    #[test]
    fn percent_bounds() {
        assert_eq!(percent(0, 200), 0);
        assert_eq!(percent(50, 200), 25);
        assert_eq!(percent(200, 200), 100);
        assert_eq!(percent(300, 200), 100);
        assert_eq!(percent(0, 0), 100);
    }

    #[tokio::test]
    async fn counting_reports_cumulative_bytes() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let chunks: Vec<Result<Vec<u8>, std::io::Error>> =
            vec![Ok(vec![0; 3]), Ok(vec![0; 5]), Ok(vec![0; 2])];
        let collected: Vec<_> = counting(stream::iter(chunks), tx).collect().await;
        assert_eq!(collected.len(), 3);

        let mut reported = Vec::new();
        while let Ok(sent) = rx.try_recv() {
            reported.push(sent);
        }
        assert_eq!(reported, vec![3, 8, 10]);
    }
}
