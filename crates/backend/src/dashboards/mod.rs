pub mod d402_returns_dashboard;
