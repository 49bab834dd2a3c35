use futures::stream;
use lazyrange::{error::Error, iterable::LazyIterable};
use std::path::PathBuf;
use tokio::{
    fs::File,
    io::{AsyncBufReadExt, BufReader, Lines},
};

enum ReadState {
    Closed(PathBuf),
    Open(Lines<BufReader<File>>),
    Done,
}

/// An iterable over the lines of a file.
///
/// Every session opens the file on its first pull and closes it when the
/// session completes, is cancelled or is dropped.
pub fn file_lines(path: PathBuf) -> LazyIterable<String> {
    LazyIterable::from_stream(move |mode| {
        tracing::debug!("scanning {:?} in {:?} mode", path, mode);

        stream::unfold(ReadState::Closed(path.clone()), |state| async move {
            let mut lines = match state {
                ReadState::Closed(path) => match File::open(&path).await {
                    Ok(f) => BufReader::new(f).lines(),
                    Err(e) => {
                        tracing::warn!("failed to open {:?}: {}", path, e);

                        return Some((Err(Error::from(e)), ReadState::Done));
                    }
                },
                ReadState::Open(lines) => lines,
                ReadState::Done => return None,
            };

            match lines.next_line().await {
                Ok(Some(line)) => Some((Ok(line), ReadState::Open(lines))),
                Ok(None) => None,
                Err(e) => Some((Err(Error::from(e)), ReadState::Done)),
            }
        })
    })
}
