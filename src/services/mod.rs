pub(crate) mod attempt_finalize;
pub(crate) mod attempt_timing;
pub(crate) mod exam_scoring;
pub(crate) mod objective_scoring;
pub(crate) mod result_builder;
pub(crate) mod similarity_scoring;
