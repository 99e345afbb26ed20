use nom::bytes::complete::take;
use nom::error::{Error, ErrorKind};
use nom::number::complete::{be_u16, be_u8};
use nom::{Err, IResult};

/// Bytes behind a one byte length prefix.
pub fn vec8(input: &[u8]) -> IResult<&[u8], &[u8]> {
    let (input, len) = be_u8(input)?;
    take(len as usize)(input)
}

/// Bytes behind a two byte length prefix.
pub fn vec16(input: &[u8]) -> IResult<&[u8], &[u8]> {
    let (input, len) = be_u16(input)?;
    take(len as usize)(input)
}

/// Unrecoverable parse failure at `input`.
pub fn failure<T>(input: &[u8], kind: ErrorKind) -> IResult<&[u8], T> {
    Err(Err::Failure(Error::new(input, kind)))
}

/// Require that a parser consumed everything.
pub fn all_consumed<T>(result: IResult<&[u8], T>) -> IResult<&[u8], T> {
    let (rest, value) = result?;
    if !rest.is_empty() {
        return failure(rest, ErrorKind::Eof);
    }
    Ok((rest, value))
}
