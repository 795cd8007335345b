pub(crate) use decoder::SilkDecoder;

mod decoder;
