pub mod matrix;
pub mod obj;

#[remain::sorted]
#[derive(thiserror::Error, Debug)]
pub enum Err {
    #[error("matrix i/o error: {0}")]
    MatrixError(#[from] matrix::Err),
    #[error("obj i/o error: {0}")]
    ObjError(#[from] obj::Err),
}
