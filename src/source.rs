use tokio::io::{AsyncBufRead, AsyncBufReadExt, Lines};

use crate::protocol::Bet;

/// Streams bets out of a line-oriented `name,surname,document,birthdate,number`
/// source, one bounded batch at a time.
pub struct BetReader<R> {
    lines: Lines<R>,
    agency: u8,
}

impl<R: AsyncBufRead + Unpin> BetReader<R> {
    pub fn new(reader: R, agency: u8) -> Self {
        Self {
            lines: reader.lines(),
            agency,
        }
    }

    /// Pulls up to `max` records. A line that fails to parse is logged and
    /// truncates the batch at that point; the valid prefix is still returned
    /// and the next call resumes after the bad line. An empty result means
    /// the source is exhausted.
    pub async fn next_batch(&mut self, max: usize) -> std::io::Result<Vec<Bet>> {
        let mut bets = Vec::with_capacity(max);
        while bets.len() < max {
            let Some(line) = self.lines.next_line().await? else {
                break;
            };
            match Bet::parse(&line, self.agency) {
                Ok(bet) => bets.push(bet),
                Err(e) => {
                    tracing::error!(
                        action = "parse_bet",
                        result = "fail",
                        agency = self.agency,
                        error = %e,
                    );
                    break;
                }
            }
        }
        Ok(bets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reader(csv: &str, agency: u8) -> BetReader<&[u8]> {
        BetReader::new(csv.as_bytes(), agency)
    }

    #[tokio::test]
    async fn batches_respect_the_limit() {
        let csv = "Juan,Perez,30904465,1999-03-17,7863\n\
                   Maria,Diaz,20111222,1985-11-02,4321\n\
                   Pedro,Gomez,11222333,1970-01-31,99\n";
        let mut source = reader(csv, 5);

        let first = source.next_batch(2).await.unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].first_name, "Juan");
        assert_eq!(first[1].first_name, "Maria");

        let second = source.next_batch(2).await.unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].first_name, "Pedro");

        assert!(source.next_batch(2).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn bad_line_truncates_the_batch_but_not_the_stream() {
        let csv = "Juan,Perez,30904465,1999-03-17,7863\n\
                   this line is not a bet\n\
                   Maria,Diaz,20111222,1985-11-02,4321\n";
        let mut source = reader(csv, 5);

        // the valid prefix is kept, the bad line is dropped
        let first = source.next_batch(10).await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].first_name, "Juan");

        let second = source.next_batch(10).await.unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].first_name, "Maria");
    }

    #[tokio::test]
    async fn empty_source_yields_no_batch() {
        let mut source = reader("", 3);
        assert!(source.next_batch(4).await.unwrap().is_empty());
    }
}
