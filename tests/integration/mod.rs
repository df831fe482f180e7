mod participants_flow;
mod shutai_flow;
